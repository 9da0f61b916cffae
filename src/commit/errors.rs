//! # Commit Errors

use thiserror::Error;

use crate::store::StoreError;
use crate::worker::PoolError;

/// Result type for commit operations
pub type CommitResult<T> = Result<T, CommitError>;

/// Commit errors
///
/// A reverted commit is not an error; it is `Ok(None)`.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Store failure during commit: {0}")]
    Store(#[from] StoreError),

    #[error("Commit comment of {len} bytes exceeds {max}")]
    CommentTooLong { len: usize, max: usize },

    #[error("Change checker panicked: {0}")]
    CheckerPanicked(String),

    #[error("Commit task panicked: {0}")]
    TaskPanicked(String),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
}

impl CommitError {
    /// True if the pending batch was restored before this error surfaced.
    pub fn was_reverted(&self) -> bool {
        matches!(self, CommitError::CheckerPanicked(_))
    }
}
