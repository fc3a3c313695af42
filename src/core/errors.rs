//! Error types for the resembl library.
//!
//! Every fallible component returns [`ResemblError`]; the tokenizer is total
//! and never fails. The orchestrator recovers locally from `CorruptCache` and
//! `StaleIndex` (both trigger an index rebuild); everything else surfaces to
//! the caller.

use std::io;

use thiserror::Error;

/// Main result type for resembl operations.
pub type Result<T> = std::result::Result<T, ResemblError>;

/// Error taxonomy at the core boundary.
#[derive(Error, Debug)]
pub enum ResemblError {
    /// No snippet, collection, or tag matches the given key.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was looked up
        what: String,
    },

    /// A checksum prefix or name matched more than one row.
    #[error("ambiguous {what}: {count} rows match")]
    Ambiguous {
        /// Description of the ambiguous lookup
        what: String,
        /// Number of matching rows
        count: usize,
    },

    /// A unique constraint would be violated.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// Description of the conflicting entity
        what: String,
    },

    /// Removing a name would leave a snippet with zero aliases.
    #[error("cannot remove the last name from snippet {checksum}")]
    EmptyAliasSet {
        /// Checksum of the affected snippet
        checksum: String,
    },

    /// Index parameters disagree with the MinHashes stored on snippets.
    #[error("stale index: {message}; run reindex")]
    StaleIndex {
        /// What disagreed
        message: String,
    },

    /// The on-disk LSH cache failed integrity checks. Recoverable: the
    /// orchestrator treats the cache as missing and rebuilds.
    #[error("corrupt cache: {message}")]
    CorruptCache {
        /// What failed to parse or verify
        message: String,
    },

    /// A storage operation failed in a way the caller may retry.
    #[error("transient storage error: {message}")]
    TransientStorage {
        /// Error description
        message: String,
    },

    /// A storage operation failed fatally.
    #[error("storage error: {message}")]
    PermanentStorage {
        /// Error description
        message: String,
    },

    /// Invalid input: bad config value, non-UTF-8 code, unsupported
    /// parameter combination.
    #[error("bad input: {message}")]
    BadInput {
        /// Error description
        message: String,
    },

    /// I/O error outside the storage layer (cache files, import/export).
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable context
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A long-running operation was cancelled between items.
    #[error("operation cancelled after {completed} items")]
    Cancelled {
        /// Items durably committed before the cancel flag was observed
        completed: usize,
    },
}

impl ResemblError {
    /// Create a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an `Ambiguous` error.
    pub fn ambiguous(what: impl Into<String>, count: usize) -> Self {
        Self::Ambiguous {
            what: what.into(),
            count,
        }
    }

    /// Create an `AlreadyExists` error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Create an `EmptyAliasSet` error.
    pub fn empty_alias_set(checksum: impl Into<String>) -> Self {
        Self::EmptyAliasSet {
            checksum: checksum.into(),
        }
    }

    /// Create a `StaleIndex` error.
    pub fn stale_index(message: impl Into<String>) -> Self {
        Self::StaleIndex {
            message: message.into(),
        }
    }

    /// Create a `CorruptCache` error.
    pub fn corrupt_cache(message: impl Into<String>) -> Self {
        Self::CorruptCache {
            message: message.into(),
        }
    }

    /// Create a `TransientStorage` error.
    pub fn transient_storage(message: impl Into<String>) -> Self {
        Self::TransientStorage {
            message: message.into(),
        }
    }

    /// Create a `PermanentStorage` error.
    pub fn permanent_storage(message: impl Into<String>) -> Self {
        Self::PermanentStorage {
            message: message.into(),
        }
    }

    /// Create a `BadInput` error.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Whether the orchestrator can recover from this error by rebuilding
    /// the LSH index.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CorruptCache { .. } | Self::StaleIndex { .. })
    }

    /// Process exit code for user-visible failures.
    ///
    /// 0 success, 1 user error, 2 integrity error, 3 cancelled, 4 unexpected.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. }
            | Self::Ambiguous { .. }
            | Self::AlreadyExists { .. }
            | Self::EmptyAliasSet { .. }
            | Self::BadInput { .. } => 1,
            Self::CorruptCache { .. } | Self::PermanentStorage { .. } => 2,
            Self::Cancelled { .. } => 3,
            Self::StaleIndex { .. } | Self::TransientStorage { .. } | Self::Io { .. } => 4,
        }
    }
}

impl From<io::Error> for ResemblError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<rusqlite::Error> for ResemblError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::not_found("row"),
            rusqlite::Error::SqliteFailure(code, message) => {
                let text = message.unwrap_or_else(|| code.to_string());
                match code.code {
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                        Self::transient_storage(text)
                    }
                    rusqlite::ErrorCode::ConstraintViolation => Self::already_exists(text),
                    _ => Self::permanent_storage(text),
                }
            }
            other => Self::permanent_storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ResemblError {
    fn from(err: serde_json::Error) -> Self {
        Self::permanent_storage(format!("JSON column decode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ResemblError::not_found("snippet").exit_code(), 1);
        assert_eq!(ResemblError::ambiguous("prefix abc", 2).exit_code(), 1);
        assert_eq!(ResemblError::corrupt_cache("bad CRC").exit_code(), 2);
        assert_eq!(ResemblError::Cancelled { completed: 3 }.exit_code(), 3);
        assert_eq!(ResemblError::transient_storage("busy").exit_code(), 4);
    }

    #[test]
    fn test_recoverable() {
        assert!(ResemblError::corrupt_cache("truncated").is_recoverable());
        assert!(ResemblError::stale_index("P mismatch").is_recoverable());
        assert!(!ResemblError::not_found("snippet").is_recoverable());
    }

    #[test]
    fn test_sqlite_no_rows_maps_to_not_found() {
        let err: ResemblError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, ResemblError::NotFound { .. }));
    }
}
