//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] waypost_database::DatabaseError),

    /// Configuration or path error
    #[error("Core error: {0}")]
    Core(#[from] waypost_core::CoreError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector or side channel rejected the request
    #[error("Send failed: {0}")]
    Send(String),

    /// A fix could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fix acquisition error
    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// The controller task has exited
    #[error("Delivery controller is not running")]
    ControllerClosed,
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Failure reported by a fix source.
///
/// Never fatal: the controller logs it and keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed fix: {0}")]
    Malformed(String),
}

impl From<std::io::Error> for AcquisitionError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(e.to_string()),
            _ => Self::Unavailable(e.to_string()),
        }
    }
}
