//! Upload manager port definition.
//!
//! This port is the only surface a caller should depend on. It hides the
//! runner, cancellation tokens, and adapters behind a small async API.
//!
//! # Design
//!
//! - Only core upload domain types in signatures
//! - Callers never mutate item state directly; every change goes through here
//! - Observation happens through the injected `UploadEventEmitterPort`

use async_trait::async_trait;
use std::time::Duration;

use crate::upload::{QueueSnapshot, UploadError, UploadId, UploadItem, UploadPayload};

/// Bounds for the image transform stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Run the transform stage at all.
    pub enabled: bool,
    /// Maximum length of the long edge, in pixels.
    pub max_dimension: u32,
    /// Target maximum output size in bytes.
    pub max_bytes: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: 1920,
            max_bytes: 1024 * 1024,
        }
    }
}

impl TransformConfig {
    /// A config that skips the transform stage.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Configuration for creating an upload manager.
#[derive(Debug, Clone)]
pub struct UploadManagerConfig {
    /// Attempt budget for each item.
    pub max_attempts: u32,
    /// Payloads above this size use the multi-part strategy.
    pub chunk_threshold: u64,
    /// Minimum interval between progress events for one item.
    pub progress_interval: Duration,
    /// EMA smoothing factor for speed (weight of the newest sample).
    pub ema_alpha: f64,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Upper bound for any backoff delay.
    pub retry_max_delay: Duration,
    /// Image transform bounds.
    pub transform: TransformConfig,
    /// Folder used when a payload does not name one.
    pub default_folder_id: Option<String>,
    /// Maximum number of items the queue will hold.
    pub max_queue_size: u32,
}

impl Default for UploadManagerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            chunk_threshold: 6 * 1024 * 1024,
            progress_interval: Duration::from_millis(250),
            ema_alpha: 0.3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
            transform: TransformConfig::default(),
            default_folder_id: None,
            max_queue_size: 1000,
        }
    }
}

impl UploadManagerConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget. Every item gets at least one attempt.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = if max == 0 { 1 } else { max };
        self
    }

    /// Set the single-request/multi-part threshold.
    #[must_use]
    pub const fn with_chunk_threshold(mut self, bytes: u64) -> Self {
        self.chunk_threshold = bytes;
        self
    }

    /// Set the progress sampling interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the backoff bounds.
    #[must_use]
    pub const fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Set the image transform bounds.
    #[must_use]
    pub fn with_transform(mut self, transform: TransformConfig) -> Self {
        self.transform = transform;
        self
    }

    /// Set the default destination folder.
    #[must_use]
    pub fn with_default_folder(mut self, folder_id: Option<String>) -> Self {
        self.default_folder_id = folder_id;
        self
    }

    /// Set the maximum queue size.
    #[must_use]
    pub const fn with_max_queue_size(mut self, max: u32) -> Self {
        self.max_queue_size = max;
        self
    }
}

/// Public interface of the upload queue.
#[async_trait]
pub trait UploadManagerPort: Send + Sync {
    /// Add payloads to the back of the queue, in order.
    ///
    /// Returns the new ids in the same order as `payloads`.
    async fn enqueue(&self, payloads: Vec<UploadPayload>) -> Result<Vec<UploadId>, UploadError>;

    /// Park an item. Cancels the in-flight operation if it is active.
    async fn pause(&self, id: &UploadId) -> Result<(), UploadError>;

    /// Return a paused or failed item to `Pending`.
    async fn resume(&self, id: &UploadId) -> Result<(), UploadError>;

    /// Cancel (if active) and drop an item.
    async fn remove(&self, id: &UploadId) -> Result<(), UploadError>;

    /// Drop every completed item. Returns how many were removed.
    async fn clear_completed(&self) -> Result<usize, UploadError>;

    /// Current state of one item.
    async fn get(&self, id: &UploadId) -> Option<UploadItem>;

    /// Current state of the whole queue.
    async fn snapshot(&self) -> QueueSnapshot;
}
