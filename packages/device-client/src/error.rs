//! Error types for the device client

use thiserror::Error;

use crate::models::ApiFailure;

/// Errors that can occur when talking to the device API
#[derive(Error, Debug)]
pub enum DeviceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize/deserialize JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The device API answered with an error envelope
    #[error("device API error {0}")]
    Api(ApiFailure),

    /// Envelope carried neither a result nor an error
    #[error("response envelope has no result")]
    MissingResult,

    /// Non-success status without a usable envelope
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Input rejected before a request was sent
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Connection refused (API unreachable)
    #[error("connection refused. Is the device API reachable at {0}?")]
    ConnectionRefused(String),

    /// Request timeout
    #[error("request to the device API timed out")]
    Timeout,

    /// Event stream failed mid-read
    #[error("event stream error: {0}")]
    Stream(String),
}

impl DeviceError {
    /// Check whether the device reported itself as offline
    pub fn is_disconnected(&self) -> bool {
        match self {
            DeviceError::Api(failure) => !failure.connected,
            DeviceError::ConnectionRefused(_) => true,
            _ => false,
        }
    }

    /// Map a transport error into the most specific variant
    pub(crate) fn from_transport(error: reqwest::Error, url: &str) -> Self {
        if error.is_connect() {
            DeviceError::ConnectionRefused(url.to_string())
        } else if error.is_timeout() {
            DeviceError::Timeout
        } else {
            DeviceError::Http(error)
        }
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Truncate error body to prevent memory exhaustion
/// Safely handles UTF-8 boundaries to avoid panics on multi-byte characters
pub(crate) fn truncate_error_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY_SIZE {
        return body;
    }

    let truncate_at = body
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
        .last()
        .unwrap_or(0);

    format!("{}... (truncated)", &body[..truncate_at])
}
