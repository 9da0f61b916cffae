//! termcore - identifier resolution and STAMP versioning for terminology
//! data
//!
//! - `identifier`: UUID → nid resolution over 256 lazily loaded shards
//! - `sequence`: dense nid ↔ sequence numbering per component kind
//! - `store`: segmented, file-backed sequence → value storage
//! - `stamp`: STAMP values and the pending, alias and comment indexes
//! - `commit`: change checking and atomic commit of pending stamps
//! - `context`: `TermStore`, which owns one instance of all of the above

pub mod cli;
pub mod collections;
pub mod commit;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod identifier;
pub mod observability;
pub mod sequence;
pub mod stamp;
pub mod store;
pub mod worker;

pub use config::Config;
pub use context::{StoreStats, TermStore};
pub use error::{Error, Result};
