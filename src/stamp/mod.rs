//! STAMP model and the indexes around it
//!
//! - `Stamp`: the `(status, time, author, module, path)` provenance value
//! - `PendingStampMap`: uncommitted stamps, deduplicated by tuple
//! - `StampAliasMap`: equivalence edges between stamp sequences
//! - `StampCommentMap`: commit comments by stamp sequence
//! - `StampService`: owns all of the above plus the committed stamp store

mod alias;
mod comment;
mod pending;
mod service;
mod stamp;
mod status;

pub use alias::{AliasWalk, StampAliasMap, MAX_ALIAS_CHAIN};
pub use comment::{StampCommentMap, MAX_COMMENT_BYTES};
pub use pending::{PendingStampMap, UncommittedStamp};
pub use service::{StampService, ALIAS_FILE, COMMENT_FILE, STAMP_FOLDER, STAMP_SUFFIX};
pub use stamp::{Stamp, StampKey, CANCELED_TIME, ENCODED_LEN, MAX_FIELD_SEQUENCE, UNCOMMITTED_TIME};
pub use status::Status;
