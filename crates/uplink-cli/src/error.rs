//! CLI-specific error types and mappings.

use thiserror::Error;
use uplink_core::UploadError;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Error reported by the upload queue or a storage adapter.
    #[error("{0}")]
    Upload(String),

    /// Some items ended in `Failed`.
    #[error("{failed} of {total} uploads failed")]
    UploadsFailed {
        /// Number of failed items.
        failed: usize,
        /// Number of items enqueued.
        total: usize,
    },

    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Upload(_) | Self::UploadsFailed { .. } => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }
}

impl From<UploadError> for CliError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::EmptyPayload { .. } | UploadError::QueueFull { .. } => {
                Self::Arguments(err.user_message())
            }
            UploadError::AuthenticationMissing { .. } => Self::Config(err.user_message()),
            other => Self::Upload(other.user_message()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
