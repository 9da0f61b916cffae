//! Segmented object store and the binary file helpers every persisted
//! structure shares.
//!
//! # Design Principles
//!
//! - Lock-free reads, copy-on-grow segment arrays
//! - One file per segment, each self-describing
//! - Big-endian integers throughout
//! - Any I/O failure fails the whole operation; nothing is retried

pub mod codec;
mod errors;
pub(crate) mod files;
mod segment;
mod segmented;

pub use codec::StoreCodec;
pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use segmented::{SegmentedObjectStore, DEFAULT_SEGMENT_SIZE};
