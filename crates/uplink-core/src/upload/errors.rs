//! Upload error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error` or `reqwest::Error`. Adapters capture the
//! kind and message as strings at the port boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for upload operations.
///
/// Serializable so it can travel inside events and snapshots without
/// depending on non-serializable transport errors.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadError {
    /// No user or session was available when the transfer started.
    #[error("Authentication missing: {message}")]
    AuthenticationMissing {
        /// What was missing.
        message: String,
    },

    /// Transport-level failure (connection reset, DNS, timeout).
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The server answered but refused the request.
    #[error("Server rejected upload: {message}")]
    ServerRejected {
        /// Detailed error message (usually the response body).
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        /// Whether retrying cannot help (naming conflict, payload too large).
        permanent: bool,
    },

    /// The in-flight operation was cancelled by the caller.
    #[error("Upload cancelled")]
    Cancelled,

    /// The object landed but the metadata record could not be written.
    #[error("Metadata commit failed: {message}")]
    MetadataCommit {
        /// Detailed error message.
        message: String,
    },

    /// I/O error in a local adapter.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Zero-length payloads cannot be uploaded.
    #[error("Empty payload: {name}")]
    EmptyPayload {
        /// Name of the rejected payload.
        name: String,
    },

    /// Queue is full, cannot add more uploads.
    #[error("Queue full: maximum {max_size} uploads allowed")]
    QueueFull {
        /// Maximum queue capacity.
        max_size: u32,
    },

    /// Upload id not found in the queue.
    #[error("Not in queue: {id}")]
    NotInQueue {
        /// The id that wasn't found.
        id: String,
    },

    /// The requested action is not valid for the item's current status.
    #[error("Cannot {action} upload {id} while {from}")]
    InvalidTransition {
        /// The item id.
        id: String,
        /// Status the item was in.
        from: String,
        /// Action that was attempted.
        action: String,
    },

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl UploadError {
    /// Create an authentication-missing error.
    pub fn authentication_missing(message: impl Into<String>) -> Self {
        Self::AuthenticationMissing {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a server rejection.
    ///
    /// Permanence is derived from the status code: conflicts and
    /// client-side errors are permanent, throttling and 5xx are not.
    pub fn server_rejected(message: impl Into<String>, status_code: u16) -> Self {
        Self::ServerRejected {
            message: message.into(),
            status_code: Some(status_code),
            permanent: is_permanent_status(status_code),
        }
    }

    /// Create a permanent server rejection without a status code.
    pub fn permanent_rejection(message: impl Into<String>) -> Self {
        Self::ServerRejected {
            message: message.into(),
            status_code: None,
            permanent: true,
        }
    }

    /// Create a metadata commit error.
    pub fn metadata_commit(message: impl Into<String>) -> Self {
        Self::MetadataCommit {
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create an empty payload error.
    pub fn empty_payload(name: impl Into<String>) -> Self {
        Self::EmptyPayload { name: name.into() }
    }

    /// Create a queue full error.
    #[must_use]
    pub const fn queue_full(max_size: u32) -> Self {
        Self::QueueFull { max_size }
    }

    /// Create a not in queue error.
    pub fn not_in_queue(id: impl Into<String>) -> Self {
        Self::NotInQueue { id: id.into() }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        id: impl Into<String>,
        from: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from: from.into(),
            action: action.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether an automatic retry may help.
    ///
    /// Cancellation is never retryable: it is caller-initiated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Io { .. } => true,
            Self::ServerRejected { permanent, .. } => !*permanent,
            _ => false,
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationMissing { .. } => "You must be logged in to upload files".to_string(),
            Self::Network {
                message,
                status_code: Some(code),
            } => format!("Network error (HTTP {code}): {message}"),
            Self::Network { message, .. } => format!("Network error: {message}"),
            Self::ServerRejected {
                message,
                status_code: Some(409),
                ..
            } => format!("A file with this name already exists: {message}"),
            Self::ServerRejected {
                message,
                status_code: Some(code),
                ..
            } => format!("Upload failed with status {code}: {message}"),
            Self::ServerRejected { message, .. } => format!("Upload rejected: {message}"),
            Self::Cancelled => "Upload was cancelled.".to_string(),
            Self::MetadataCommit { message } => {
                format!("File uploaded but could not be saved: {message}")
            }
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::EmptyPayload { name } => format!("'{name}' is empty and cannot be uploaded."),
            Self::QueueFull { max_size } => {
                format!("Upload queue is full (max {max_size} items). Clear completed uploads first.")
            }
            Self::NotInQueue { id } => format!("Upload '{id}' is not in the queue."),
            Self::InvalidTransition { id, from, action } => {
                format!("Cannot {action} upload '{id}' while it is {from}.")
            }
            Self::Other { message } => message.clone(),
        }
    }
}

/// HTTP statuses that will not change on retry.
const fn is_permanent_status(status_code: u16) -> bool {
    !matches!(status_code, 408 | 425 | 429) && status_code >= 400 && status_code < 500
}

/// Convenience result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
