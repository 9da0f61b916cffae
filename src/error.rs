//! Crate-level error type
//!
//! Each subsystem keeps its own error; this enum only wraps them for
//! callers of `TermStore`.

use thiserror::Error;

use crate::commit::CommitError;
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::worker::PoolError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Store metadata error: {0}")]
    Metadata(String),
}

impl Error {
    /// True for errors after which the store must not be used further.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Store(e) => e.is_fatal(),
            Error::Commit(CommitError::Store(e)) => e.is_fatal(),
            Error::Pool(PoolError::ShutdownTimeout(_)) => true,
            _ => false,
        }
    }
}
