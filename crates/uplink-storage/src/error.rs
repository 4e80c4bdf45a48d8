//! Internal error types for the storage adapters.
//!
//! Adapters fail with `StorageError` internally; every port method maps it to
//! the classified `UploadError` at the boundary.

use serde::Deserialize;
use thiserror::Error;
use uplink_core::UploadError;

/// Result type alias for adapter operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The server answered with a non-success status.
    #[error("Request failed with status {status}: {message}")]
    Http {
        /// Effective status code (the body's `statusCode` when present).
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// An object already exists at the target path.
    #[error("Object already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: String,
    },

    /// A remote path that does not stay inside the store.
    #[error("Invalid object path: {path}")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// The server answered with something we could not interpret.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of what was invalid.
        message: String,
    },

    /// Network or HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error body returned by the storage and REST APIs.
///
/// Storage reports some conflicts as HTTP 400 with `"statusCode": "409"` in
/// the body, so the body code wins over the transport status.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "statusCode", default)]
    status_code: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StorageError {
    /// Build an `Http` error from a status and raw response body.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

        let status = parsed
            .status_code
            .as_ref()
            .and_then(|code| match code {
                serde_json::Value::String(s) => s.parse().ok(),
                serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                _ => None,
            })
            .unwrap_or(status);

        let message = match (parsed.error, parsed.message) {
            (Some(error), Some(message)) => format!("{error}: {message}"),
            (None, Some(message)) => message,
            (Some(error), None) => error,
            (None, None) if body.trim().is_empty() => format!("HTTP {status}"),
            (None, None) => body.trim().to_string(),
        };

        Self::Http { status, message }
    }

    /// Consume a non-success response into an `Http` error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => Self::from_body(status, &body),
            Err(e) => Self::Network(e),
        }
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Http { status, message } => Self::server_rejected(message, status),
            StorageError::AlreadyExists { path } => {
                Self::server_rejected(format!("The resource already exists: {path}"), 409)
            }
            StorageError::InvalidPath { path } => {
                Self::permanent_rejection(format!("Invalid object path: {path}"))
            }
            StorageError::InvalidResponse { message } => Self::network(message),
            StorageError::Network(e) => match e.status() {
                Some(status) => Self::network_with_status(e.to_string(), status.as_u16()),
                None => Self::network(e.to_string()),
            },
            StorageError::InvalidUrl(e) => Self::other(format!("Invalid storage URL: {e}")),
            StorageError::Json(e) => Self::network(format!("Malformed response: {e}")),
            StorageError::Io(e) => Self::from_io_error(&e),
        }
    }
}
