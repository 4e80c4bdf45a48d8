//! Object store port definition.
//!
//! Abstracts the remote blob store the queue uploads into. Implementations
//! own the wire protocol; the queue only cares about outcome classification
//! and byte-level progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::upload::UploadError;

/// How a payload is put on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStrategy {
    /// One request carrying the whole body.
    SingleRequest,
    /// Multi-part or streamed transfer for payloads above the chunk threshold.
    Multipart,
}

impl TransferStrategy {
    /// Pick a strategy for a payload of `len` bytes.
    ///
    /// Payloads at or below the threshold use a single request.
    #[must_use]
    pub const fn for_len(len: u64, chunk_threshold: u64) -> Self {
        if len <= chunk_threshold {
            Self::SingleRequest
        } else {
            Self::Multipart
        }
    }
}

/// Callback receiving the cumulative number of bytes sent.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// A single put request.
#[derive(Clone, Debug)]
pub struct PutObject {
    /// Namespaced remote path.
    pub path: String,
    /// Payload bytes.
    pub body: Bytes,
    /// MIME type sent with the object.
    pub content_type: String,
    /// Strategy chosen by the executor.
    pub strategy: TransferStrategy,
    /// Bearer token for the current session.
    pub auth_token: String,
}

/// Port for the remote object store.
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// Whether `put_object` invokes the progress callback for this strategy.
    ///
    /// When this returns `false` the executor drives a simulated estimate
    /// instead of leaving progress frozen.
    fn reports_progress(&self, strategy: TransferStrategy) -> bool;

    /// Upload an object. Must not overwrite an existing object.
    ///
    /// Dropping the returned future aborts the in-flight request.
    async fn put_object(
        &self,
        request: PutObject,
        progress: ProgressCallback,
    ) -> Result<(), UploadError>;

    /// Check whether an object exists at `path`.
    async fn object_exists(&self, path: &str, auth_token: &str) -> Result<bool, UploadError>;

    /// Create a time-limited download URL for `path`.
    async fn signed_download_url(
        &self,
        path: &str,
        ttl: Duration,
        auth_token: &str,
    ) -> Result<String, UploadError>;
}
