//! Error types for sync-daemon.

use sync_client::ApiError;

/// Main error type for synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Streaming API error.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A live or replay task panicked or was cancelled.
    #[error("{task} task failed: {source}")]
    TaskFailed {
        /// Which task.
        task: crate::engine::TaskKind,
        /// Join error reported by the runtime.
        source: tokio::task::JoinError,
    },

    /// The engine already failed fatally and schedules nothing more.
    #[error("engine stopped after a fatal error")]
    EngineStopped,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the error may go away if the work is retried later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SyncError::Api(e) if e.is_retriable())
    }

    /// The API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A ledger statement touched the wrong number of rows.
    #[error("{operation} of replay window {window} affected {rows} rows, expected 1")]
    UnexpectedRowCount {
        /// `insert` or `delete`.
        operation: &'static str,
        /// The window, displayed.
        window: String,
        /// Rows actually affected.
        rows: u64,
    },

    /// A stored row could not be turned back into a value.
    #[error("corrupt {table} row: {reason}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The ledger holds more than one potential window.
    #[error("ledger holds {count} potential windows, expected at most 1")]
    MultiplePotentialWindows {
        /// Number found.
        count: usize,
    },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::{FatalKind, RetriableKind};

    #[test]
    fn retriable_api_errors_are_retriable() {
        let err = SyncError::from(ApiError::retriable(RetriableKind::ServerError));
        assert!(err.is_retriable());
        assert!(err.as_api().is_some());
    }

    #[test]
    fn other_errors_are_not_retriable() {
        let fatal = SyncError::from(ApiError::fatal(FatalKind::NoAccess));
        assert!(!fatal.is_retriable());

        let invalid = SyncError::from(ApiError::InvalidRequest);
        assert!(!invalid.is_retriable());

        let storage = SyncError::from(StorageError::UnexpectedRowCount {
            operation: "delete",
            window: "[a -> b]".into(),
            rows: 0,
        });
        assert!(!storage.is_retriable());
        assert!(storage.as_api().is_none());
    }

    #[test]
    fn row_count_error_names_the_window() {
        let err = StorageError::UnexpectedRowCount {
            operation: "insert",
            window: "[a -> ...]".into(),
            rows: 0,
        };
        assert_eq!(
            err.to_string(),
            "insert of replay window [a -> ...] affected 0 rows, expected 1"
        );
    }
}
