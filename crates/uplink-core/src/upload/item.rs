//! Upload item snapshot and status.
//!
//! `UploadItem` is the full observable state of one queued unit of work. The
//! scheduler owns the authoritative copy; everything handed to callers and
//! listeners is a clone.

use serde::{Deserialize, Serialize};

use super::types::UploadId;

/// Status of an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Waiting for the slot.
    Pending,
    /// Running the pre-transfer transform.
    Transforming,
    /// Bytes are on the wire.
    Transferring,
    /// Transfer finished, registering metadata.
    Committing,
    /// Waiting out a backoff delay before re-entering `Pending`.
    Retrying {
        /// Failed attempts so far (already incremented).
        attempt: u32,
        /// Scheduled delay before the item becomes `Pending` again.
        delay_ms: u64,
    },
    /// Parked by the caller.
    Paused,
    /// Uploaded and registered.
    Completed,
    /// Terminal failure (see `last_error`).
    Failed,
}

impl UploadStatus {
    /// Whether this status occupies the single transfer slot.
    #[must_use]
    pub const fn occupies_slot(&self) -> bool {
        matches!(self, Self::Transforming | Self::Transferring | Self::Committing)
    }

    /// Whether the item has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `pause` is a valid action from this status.
    #[must_use]
    pub const fn can_pause(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::Transforming
                | Self::Transferring
                | Self::Committing
                | Self::Retrying { .. }
        )
    }

    /// Whether `resume` is a valid action from this status.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        matches!(self, Self::Paused | Self::Failed)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transforming => "transforming",
            Self::Transferring => "transferring",
            Self::Committing => "committing",
            Self::Retrying { .. } => "retrying",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one queued upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    /// Item identity.
    pub id: UploadId,
    /// Original file name.
    pub name: String,
    /// Declared content type.
    pub content_type: String,
    /// Destination folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Immutable FIFO position (monotonic across the queue's lifetime).
    pub enqueue_seq: u64,
    /// Current status.
    pub status: UploadStatus,
    /// Attempt epoch; bumped every time the pipeline starts for this item.
    ///
    /// Listeners use it to tell a legitimate progress reset (new epoch)
    /// from a regression.
    pub epoch: u64,
    /// Percent complete within the current epoch (0-100).
    pub progress_percent: u8,
    /// Bytes sent within the current epoch.
    pub bytes_transferred: u64,
    /// Smoothed transfer speed in bytes per second.
    pub speed_bytes_per_sec: f64,
    /// Seconds remaining, if a speed estimate exists.
    pub eta_seconds: Option<f64>,
    /// Whether progress comes from the simulated estimator.
    pub progress_simulated: bool,
    /// Human-readable message for the most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Failed attempts so far.
    pub attempt_count: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Size of the payload as enqueued.
    pub original_byte_length: u64,
    /// Size after the transform stage, once it has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed_byte_length: Option<u64>,
    /// Remote path; assigned when a transfer starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

impl UploadItem {
    /// Create a fresh `Pending` item.
    pub fn new(
        id: UploadId,
        name: impl Into<String>,
        content_type: impl Into<String>,
        original_byte_length: u64,
        enqueue_seq: u64,
        max_attempts: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            content_type: content_type.into(),
            folder_id: None,
            enqueue_seq,
            status: UploadStatus::Pending,
            epoch: 0,
            progress_percent: 0,
            bytes_transferred: 0,
            speed_bytes_per_sec: 0.0,
            eta_seconds: None,
            progress_simulated: false,
            last_error: None,
            attempt_count: 0,
            max_attempts,
            original_byte_length,
            transformed_byte_length: None,
            remote_path: None,
        }
    }

    /// Bytes the current epoch is expected to send.
    #[must_use]
    pub fn transfer_total(&self) -> u64 {
        self.transformed_byte_length
            .unwrap_or(self.original_byte_length)
    }

    /// Zero the per-epoch counters.
    pub fn reset_progress(&mut self) {
        self.progress_percent = 0;
        self.bytes_transferred = 0;
        self.speed_bytes_per_sec = 0.0;
        self.eta_seconds = None;
        self.progress_simulated = false;
    }
}
