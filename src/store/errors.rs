//! Store error types
//!
//! Error codes:
//! - TERM_STORE_IO_ERROR (ERROR severity)
//! - TERM_STORE_WRITE_FAILED (ERROR severity)
//! - TERM_STORE_READ_FAILED (ERROR severity)
//! - TERM_DATA_CORRUPTION (FATAL severity)
//!
//! I/O failures are never retried here. The caller decides.

use std::fmt;
use std::io;
use std::path::Path;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the store stays usable
    Error,
    /// Persisted state cannot be trusted; the store must not continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk I/O failure outside a read or write of store data
    TermStoreIoError,
    /// Persisting store data failed
    TermStoreWriteFailed,
    /// Loading store data failed
    TermStoreReadFailed,
    /// Persisted data is malformed
    TermDataCorruption,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::TermStoreIoError => "TERM_STORE_IO_ERROR",
            StoreErrorCode::TermStoreWriteFailed => "TERM_STORE_WRITE_FAILED",
            StoreErrorCode::TermStoreReadFailed => "TERM_STORE_READ_FAILED",
            StoreErrorCode::TermDataCorruption => "TERM_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::TermStoreIoError => Severity::Error,
            StoreErrorCode::TermStoreWriteFailed => Severity::Error,
            StoreErrorCode::TermStoreReadFailed => Severity::Error,
            StoreErrorCode::TermDataCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with code, message, optional context and I/O source
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source,
        }
    }

    /// Create a generic I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::TermStoreIoError, message, Some(source))
    }

    /// Create a write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::TermStoreWriteFailed, message, Some(source))
    }

    /// Create a write failed error without an I/O source
    pub fn write_failed_no_source(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::TermStoreWriteFailed, message, None)
    }

    /// Create a read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::TermStoreReadFailed, message, Some(source))
    }

    /// Create a data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::TermDataCorruption, message, None)
    }

    /// Create a data corruption error naming the file it was found in
    pub fn corruption_in_file(path: &Path, reason: impl Into<String>) -> Self {
        Self::data_corruption(reason).with_path(path)
    }

    /// Attach the file the error concerns
    pub fn with_path(mut self, path: &Path) -> Self {
        self.details = Some(format!("path: {}", path.display()));
        self
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " caused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::TermStoreIoError.code(), "TERM_STORE_IO_ERROR");
        assert_eq!(StoreErrorCode::TermStoreWriteFailed.code(), "TERM_STORE_WRITE_FAILED");
        assert_eq!(StoreErrorCode::TermStoreReadFailed.code(), "TERM_STORE_READ_FAILED");
        assert_eq!(StoreErrorCode::TermDataCorruption.code(), "TERM_DATA_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StoreError::data_corruption("bad header").is_fatal());
        let err = StoreError::write_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let err = StoreError::corruption_in_file(&PathBuf::from("/tmp/3-uuid-nid.map"), "truncated");
        let display = err.to_string();
        assert!(display.contains("TERM_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("truncated"));
        assert!(display.contains("3-uuid-nid.map"));
    }

    #[test]
    fn test_source_is_chained() {
        use std::error::Error;
        let err = StoreError::read_failed(
            "cannot open",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
    }
}
