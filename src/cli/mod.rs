//! CLI module for termcore
//!
//! Provides command-line interface for:
//! - init: Create the data directory and an empty store
//! - resolve: UUIDs to nid
//! - lookup: nid to UUIDs
//! - stamp: Show one stamp
//! - stats: Store counts

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, lookup, resolve, run, run_command, stamp, stats};
pub use errors::{CliError, CliErrorCode, CliResult};
