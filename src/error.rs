//! Error types for the device store and the AI backend.

use thiserror::Error;

/// Result type for device store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the device store.
///
/// Only [`StoreError::QuotaExceeded`] is meaningful to callers: every other
/// failure is logged and treated as "absent" by [`crate::storage::DurableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store quota exceeded: used {used} of {capacity} bytes, write needs {requested}")]
    QuotaExceeded {
        used: u64,
        capacity: u64,
        requested: u64,
    },

    #[error("store backend failed: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the write was rejected because the store is full.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Errors from a conversational AI backend.
///
/// Every variant is recoverable by tier escalation in the chat orchestrator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_is_detected() {
        let err = StoreError::QuotaExceeded {
            used: 90,
            capacity: 100,
            requested: 20,
        };
        assert!(err.is_quota_exceeded());
        assert!(err.to_string().contains("90 of 100"));

        assert!(!StoreError::Backend("disk gone".into()).is_quota_exceeded());
    }

    #[test]
    fn test_backend_status_message() {
        let err = BackendError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "backend returned 503: overloaded");
    }
}
