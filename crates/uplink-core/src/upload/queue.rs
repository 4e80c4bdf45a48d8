//! Queue snapshot DTO.
//!
//! "UI safe" view of the whole queue: Clone + Debug + Serialize with no
//! infrastructure dependencies.

use serde::{Deserialize, Serialize};

use super::item::{UploadItem, UploadStatus};
use super::types::UploadId;

/// Snapshot of the entire upload queue, in enqueue order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Every item currently owned by the queue.
    pub items: Vec<UploadItem>,
    /// Item holding the slot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_id: Option<UploadId>,
    /// Items waiting for the slot.
    pub pending_count: u32,
    /// Items that finished successfully.
    pub completed_count: u32,
    /// Items that failed terminally.
    pub failed_count: u32,
}

impl QueueSnapshot {
    /// Build a snapshot from items already in enqueue order.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_items(items: Vec<UploadItem>) -> Self {
        let count = |pred: fn(&UploadStatus) -> bool| {
            items.iter().filter(|item| pred(&item.status)).count() as u32
        };
        let pending_count = count(|s| matches!(s, UploadStatus::Pending));
        let completed_count = count(|s| matches!(s, UploadStatus::Completed));
        let failed_count = count(|s| matches!(s, UploadStatus::Failed));
        let active_id = items
            .iter()
            .find(|item| item.status.occupies_slot())
            .map(|item| item.id);

        Self {
            items,
            active_id,
            pending_count,
            completed_count,
            failed_count,
        }
    }

    /// Check if the queue is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the total number of items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Get an item by its id.
    pub fn get(&self, id: &UploadId) -> Option<&UploadItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Whether every item has reached a terminal state.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }
}
