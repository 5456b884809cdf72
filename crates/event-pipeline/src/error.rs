//! Pipeline error types.

use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding error for the `data` column
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted row could not be decoded into an event record
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord {
        /// Row id of the corrupt record.
        id: i64,
        /// What failed to decode.
        reason: String,
    },

    /// The store lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing pipeline error type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The host has not configured/activated the pipeline
    #[error("Event pipeline is not configured")]
    NotConfigured,

    /// No device identity is known yet
    #[error("Device identity unavailable")]
    DeviceUnavailable,

    /// The event was rejected before any delivery attempt
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The collector rejected the event; retrying will not help
    #[error("Event rejected by collector (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status returned by the collector.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_status() {
        let err = PipelineError::Rejected {
            status: 422,
            message: "unknown event type".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Event rejected by collector (HTTP 422): unknown event type"
        );
    }

    #[test]
    fn test_store_error_converts_into_pipeline_error() {
        let err: PipelineError = StoreError::CorruptRecord {
            id: 7,
            reason: "bad data".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            PipelineError::Store(StoreError::CorruptRecord { id: 7, .. })
        ));
    }
}
