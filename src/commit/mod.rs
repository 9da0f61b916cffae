//! Commit engine
//!
//! Edits accumulate as pending stamps plus uncommitted component sequences.
//! A commit runs the registered change checkers, then either finalizes every
//! pending stamp with one shared commit time and emits a `CommitRecord`, or
//! reverts and leaves the committed store untouched.

mod alert;
mod checker;
mod errors;
mod listener;
mod record;
mod registry;
mod service;
mod task;

pub use alert::{Alert, AlertCollection, AlertSeverity};
pub use checker::{ChangeChecker, CheckPhase};
pub use errors::{CommitError, CommitResult};
pub use listener::CommitListener;
pub use record::CommitRecord;
pub use registry::{ActiveTaskGuard, ActiveTaskRegistry};
pub use service::CommitService;
pub use task::{CommitState, CommitTask, UncommittedSets};
