//! Upload events - discriminated union for all queue state changes.

use serde::{Deserialize, Serialize};

use super::item::UploadItem;
use super::queue::QueueSnapshot;
use super::types::UploadId;

/// Single discriminated union for all upload events.
///
/// The frontend handles this as a discriminated union:
///
/// ```typescript
/// type UploadEvent =
///   | { type: "item_changed"; item: UploadItem }
///   | { type: "item_removed"; id: string }
///   | { type: "transform_applied"; id: string; original_bytes: number; ... }
///   | { type: "retry_scheduled"; id: string; attempt: number; delay_ms: number; ... }
///   | { type: "queue_snapshot"; snapshot: QueueSnapshot }
///   | { type: "queue_drained" };
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// An item changed; carries the full current snapshot.
    ItemChanged {
        /// The item after the change.
        item: UploadItem,
    },

    /// An item was removed from the queue.
    ItemRemoved {
        /// The removed item's id.
        id: UploadId,
    },

    /// The transform stage shrank a payload.
    TransformApplied {
        /// Item id.
        id: UploadId,
        /// Size before transform.
        original_bytes: u64,
        /// Size after transform.
        transformed_bytes: u64,
        /// Size reduction in percent (0.0 - 100.0).
        reduction_percent: f64,
    },

    /// A retryable failure was recorded and a retry is scheduled.
    RetryScheduled {
        /// Item id.
        id: UploadId,
        /// Failed attempts so far.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Delay before the item re-enters `Pending`.
        delay_ms: u64,
    },

    /// Snapshot of the whole queue after a structural change.
    QueueSnapshot {
        /// Current queue contents.
        snapshot: QueueSnapshot,
    },

    /// No item is pending or active any more.
    QueueDrained,
}

impl UploadEvent {
    /// Create an item-changed event.
    #[must_use]
    pub fn item_changed(item: &UploadItem) -> Self {
        Self::ItemChanged { item: item.clone() }
    }

    /// Create a transform-applied event, computing the reduction ratio.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn transform_applied(id: UploadId, original_bytes: u64, transformed_bytes: u64) -> Self {
        let reduction_percent = if original_bytes > 0 {
            (1.0 - transformed_bytes as f64 / original_bytes as f64) * 100.0
        } else {
            0.0
        };
        Self::TransformApplied {
            id,
            original_bytes,
            transformed_bytes,
            reduction_percent,
        }
    }

    /// Id of the item this event concerns, if any.
    #[must_use]
    pub const fn item_id(&self) -> Option<UploadId> {
        match self {
            Self::ItemChanged { item } => Some(item.id),
            Self::ItemRemoved { id }
            | Self::TransformApplied { id, .. }
            | Self::RetryScheduled { id, .. } => Some(*id),
            Self::QueueSnapshot { .. } | Self::QueueDrained => None,
        }
    }
}
