//! CLI argument definitions using clap
//!
//! Commands:
//! - termcore init --config <path>
//! - termcore resolve --config <path> <uuid>...
//! - termcore lookup --config <path> <nid>
//! - termcore stamp --config <path> <sequence>
//! - termcore stats --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// termcore - identifier resolution and STAMP versioning store
#[derive(Parser, Debug)]
#[command(name = "termcore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./termcore.json")]
        config: PathBuf,
    },

    /// Resolve one component's UUIDs to its nid, assigning one if needed
    Resolve {
        /// Path to configuration file
        #[arg(long, default_value = "./termcore.json")]
        config: PathBuf,

        /// UUIDs of the component
        #[arg(required = true)]
        uuids: Vec<Uuid>,
    },

    /// List the UUIDs mapped to a nid
    Lookup {
        /// Path to configuration file
        #[arg(long, default_value = "./termcore.json")]
        config: PathBuf,

        /// Native id (negative)
        #[arg(allow_negative_numbers = true)]
        nid: i32,
    },

    /// Show a stamp with its comment and aliases
    Stamp {
        /// Path to configuration file
        #[arg(long, default_value = "./termcore.json")]
        config: PathBuf,

        /// Stamp sequence
        sequence: u32,
    },

    /// Print store statistics
    Stats {
        /// Path to configuration file
        #[arg(long, default_value = "./termcore.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
