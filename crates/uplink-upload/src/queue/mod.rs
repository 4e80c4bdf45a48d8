//! Pure state machine over the ordered item collection.
//!
//! This module contains no async, no I/O, no tracing. Every mutation takes
//! the attempt epoch it belongs to, so a late result from an abandoned
//! attempt can never move the item it used to own.

use std::time::Duration;

use bytes::Bytes;

use uplink_core::{
    QueueSnapshot, UploadError, UploadId, UploadItem, UploadPayload, UploadStatus,
};

use crate::retry::{RetryDecision, RetryPolicy};

/// Payload after the transform stage. Kept across attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPayload {
    /// Bytes to transfer.
    pub bytes: Bytes,
    /// Content type of `bytes`.
    pub content_type: String,
}

impl PreparedPayload {
    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether there are no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An object that landed remotely but has no metadata record yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncommittedUpload {
    /// Remote path of the object.
    pub remote_path: String,
    /// User that owns the object.
    pub owner_id: String,
    /// Object size.
    pub size: u64,
    /// Object content type.
    pub content_type: String,
}

/// Everything the pipeline needs for one attempt.
#[derive(Debug, Clone)]
pub struct StartedAttempt {
    /// Item after entering `Transforming`.
    pub item: UploadItem,
    /// Original payload.
    pub payload: UploadPayload,
    /// Cached transform output from an earlier attempt.
    pub prepared: Option<PreparedPayload>,
    /// Object left without a record by an earlier attempt.
    pub uncommitted: Option<UncommittedUpload>,
}

/// Progress derived from one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// Cumulative bytes sent.
    pub bytes_transferred: u64,
    /// Percent complete.
    pub percent: u8,
    /// Smoothed speed.
    pub speed_bytes_per_sec: f64,
    /// Seconds remaining.
    pub eta_seconds: Option<f64>,
    /// Whether the sample was simulated.
    pub simulated: bool,
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Waiting out a backoff.
    Retry {
        /// Item in `Retrying`.
        item: UploadItem,
        /// Backoff before `retry_elapsed` may be applied.
        delay: Duration,
    },
    /// Terminal failure.
    Failed {
        /// Item in `Failed`.
        item: UploadItem,
    },
    /// Cancelled without an explicit pause; parked.
    Paused {
        /// Item in `Paused`.
        item: UploadItem,
    },
    /// The attempt no longer owns the item (paused, removed, or superseded).
    Stale,
}

/// Result of pausing an item.
#[derive(Debug, Clone, PartialEq)]
pub struct PauseOutcome {
    /// Item in `Paused`.
    pub item: UploadItem,
    /// Whether the item held the slot; its attempt must be cancelled.
    pub was_active: bool,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    item: UploadItem,
    payload: UploadPayload,
    prepared: Option<PreparedPayload>,
    uncommitted: Option<UncommittedUpload>,
}

/// The ordered item collection.
///
/// Entries are kept in enqueue order; `enqueue_seq` never changes, so a
/// resumed item re-enters the FIFO at its original position.
#[derive(Debug, Clone)]
pub struct UploadQueue {
    entries: Vec<QueueEntry>,
    next_seq: u64,
    max_size: u32,
}

impl UploadQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new(max_size: u32) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            max_size,
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append payloads in order.
    ///
    /// The batch is validated first and either fully accepted or fully
    /// rejected.
    ///
    /// # Errors
    ///
    /// `EmptyPayload` for a zero-length payload, `QueueFull` when the batch
    /// would exceed capacity. A zero attempt budget is raised to one.
    pub fn enqueue(
        &mut self,
        payloads: Vec<UploadPayload>,
        max_attempts: u32,
        default_folder: Option<&str>,
    ) -> Result<Vec<UploadItem>, UploadError> {
        if let Some(empty) = payloads.iter().find(|p| p.is_empty()) {
            return Err(UploadError::empty_payload(&empty.name));
        }
        let max = self.max_size as usize;
        if self.entries.len().saturating_add(payloads.len()) > max {
            return Err(UploadError::queue_full(self.max_size));
        }
        let max_attempts = max_attempts.max(1);

        let mut added = Vec::with_capacity(payloads.len());
        for mut payload in payloads {
            if payload.folder_id.is_none() {
                payload.folder_id = default_folder.map(str::to_string);
            }
            let mut item = UploadItem::new(
                UploadId::generate(),
                payload.name.clone(),
                payload.content_type.clone(),
                payload.len(),
                self.next_seq,
                max_attempts,
            );
            item.folder_id.clone_from(&payload.folder_id);
            self.next_seq += 1;
            added.push(item.clone());
            self.entries.push(QueueEntry {
                item,
                payload,
                prepared: None,
                uncommitted: None,
            });
        }
        Ok(added)
    }

    /// The item holding the slot, if any.
    #[must_use]
    pub fn active(&self) -> Option<&UploadItem> {
        self.entries
            .iter()
            .map(|e| &e.item)
            .find(|item| item.status.occupies_slot())
    }

    /// Earliest-enqueued `Pending` item.
    #[must_use]
    pub fn next_pending(&self) -> Option<UploadId> {
        self.entries
            .iter()
            .filter(|e| e.item.status == UploadStatus::Pending)
            .min_by_key(|e| e.item.enqueue_seq)
            .map(|e| e.item.id)
    }

    /// Give the slot to `id` and start a new attempt epoch.
    ///
    /// # Errors
    ///
    /// `NotInQueue`, or `InvalidTransition` when the item is not `Pending`
    /// or another item holds the slot.
    pub fn begin(&mut self, id: &UploadId) -> Result<StartedAttempt, UploadError> {
        if let Some(active) = self.active() {
            return Err(UploadError::invalid_transition(
                id.to_string(),
                format!("slot held by {}", active.id),
                "start",
            ));
        }
        let entry = self.entry_mut(id)?;
        if entry.item.status != UploadStatus::Pending {
            return Err(UploadError::invalid_transition(
                id.to_string(),
                entry.item.status.as_str(),
                "start",
            ));
        }
        entry.item.status = UploadStatus::Transforming;
        entry.item.epoch += 1;
        entry.item.reset_progress();
        Ok(StartedAttempt {
            item: entry.item.clone(),
            payload: entry.payload.clone(),
            prepared: entry.prepared.clone(),
            uncommitted: entry.uncommitted.clone(),
        })
    }

    /// Cache the transform output for this and later attempts.
    ///
    /// `applied` records whether the transform changed the bytes; only then
    /// does the item report a transformed size.
    pub fn set_prepared(
        &mut self,
        id: &UploadId,
        epoch: u64,
        prepared: PreparedPayload,
        applied: bool,
    ) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| s == UploadStatus::Transforming)?;
        entry.item.transformed_byte_length = applied.then(|| prepared.len());
        entry.prepared = Some(prepared);
        Some(entry.item.clone())
    }

    /// Enter `Transferring` with the path this attempt will write.
    pub fn mark_transferring(
        &mut self,
        id: &UploadId,
        epoch: u64,
        remote_path: String,
    ) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| s == UploadStatus::Transforming)?;
        entry.item.status = UploadStatus::Transferring;
        entry.item.remote_path = Some(remote_path);
        entry.item.reset_progress();
        Some(entry.item.clone())
    }

    /// Apply a progress sample.
    ///
    /// Percent and byte count never move backwards within an epoch.
    /// Returns `None` when nothing changed or the sample is stale.
    pub fn apply_progress(
        &mut self,
        id: &UploadId,
        epoch: u64,
        report: ProgressReport,
    ) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| s == UploadStatus::Transferring)?;
        let item = &mut entry.item;
        let percent = item.progress_percent.max(report.percent.min(100));
        let bytes = item.bytes_transferred.max(report.bytes_transferred);
        let changed = percent != item.progress_percent
            || bytes != item.bytes_transferred
            || report.simulated != item.progress_simulated
            || (report.speed_bytes_per_sec - item.speed_bytes_per_sec).abs() > f64::EPSILON;
        if !changed {
            return None;
        }
        item.progress_percent = percent;
        item.bytes_transferred = bytes;
        item.speed_bytes_per_sec = report.speed_bytes_per_sec;
        item.eta_seconds = report.eta_seconds;
        item.progress_simulated = report.simulated;
        Some(item.clone())
    }

    /// Enter `Committing`: the object has landed.
    ///
    /// Accepted from `Transforming` as well, for an attempt that found the
    /// previous attempt's object already in place.
    pub fn mark_committing(
        &mut self,
        id: &UploadId,
        epoch: u64,
        upload: UncommittedUpload,
    ) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| {
            matches!(s, UploadStatus::Transforming | UploadStatus::Transferring)
        })?;
        let item = &mut entry.item;
        item.status = UploadStatus::Committing;
        item.progress_percent = 100;
        item.bytes_transferred = upload.size;
        item.eta_seconds = None;
        item.remote_path = Some(upload.remote_path.clone());
        entry.uncommitted = Some(upload);
        Some(entry.item.clone())
    }

    /// The metadata record was written.
    pub fn complete(&mut self, id: &UploadId, epoch: u64) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| s == UploadStatus::Committing)?;
        entry.item.status = UploadStatus::Completed;
        entry.item.eta_seconds = None;
        entry.item.last_error = None;
        entry.uncommitted = None;
        entry.prepared = None;
        // Nothing reads the bytes after completion.
        entry.payload.bytes = Bytes::new();
        Some(entry.item.clone())
    }

    /// Record a failed attempt and decide what happens next.
    pub fn record_failure(
        &mut self,
        id: &UploadId,
        epoch: u64,
        error: &UploadError,
        policy: &RetryPolicy,
    ) -> FailureOutcome {
        let Some(entry) = self.owned_by(id, epoch, |s| s.occupies_slot()) else {
            return FailureOutcome::Stale;
        };
        let item = &mut entry.item;

        if error.is_cancelled() {
            item.status = UploadStatus::Paused;
            stop_clock(item);
            return FailureOutcome::Paused { item: item.clone() };
        }

        item.attempt_count = item.attempt_count.saturating_add(1).min(item.max_attempts);
        item.last_error = Some(error.user_message());
        stop_clock(item);

        match policy.decide(error, item.attempt_count, item.max_attempts) {
            RetryDecision::Retry { delay } => {
                item.status = UploadStatus::Retrying {
                    attempt: item.attempt_count,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                };
                FailureOutcome::Retry {
                    item: item.clone(),
                    delay,
                }
            }
            RetryDecision::Fail | RetryDecision::Pause => {
                item.status = UploadStatus::Failed;
                FailureOutcome::Failed { item: item.clone() }
            }
        }
    }

    /// A backoff delay ran out; return the item to `Pending`.
    pub fn retry_elapsed(&mut self, id: &UploadId, epoch: u64) -> Option<UploadItem> {
        let entry = self.owned_by(id, epoch, |s| matches!(s, UploadStatus::Retrying { .. }))?;
        entry.item.status = UploadStatus::Pending;
        Some(entry.item.clone())
    }

    /// Park an item.
    ///
    /// # Errors
    ///
    /// `NotInQueue`, or `InvalidTransition` for terminal or already
    /// paused items.
    pub fn pause(&mut self, id: &UploadId) -> Result<PauseOutcome, UploadError> {
        let entry = self.entry_mut(id)?;
        let status = entry.item.status;
        if !status.can_pause() {
            return Err(UploadError::invalid_transition(id.to_string(), status.as_str(), "pause"));
        }
        let was_active = status.occupies_slot();
        entry.item.status = UploadStatus::Paused;
        stop_clock(&mut entry.item);
        Ok(PauseOutcome {
            item: entry.item.clone(),
            was_active,
        })
    }

    /// Return a paused or failed item to `Pending`.
    ///
    /// Resuming a failed item grants it a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// `NotInQueue`, or `InvalidTransition` unless the item is `Paused` or
    /// `Failed`.
    pub fn resume(&mut self, id: &UploadId) -> Result<UploadItem, UploadError> {
        let entry = self.entry_mut(id)?;
        let status = entry.item.status;
        if !status.can_resume() {
            return Err(UploadError::invalid_transition(id.to_string(), status.as_str(), "resume"));
        }
        if status == UploadStatus::Failed {
            entry.item.attempt_count = 0;
        }
        entry.item.last_error = None;
        entry.item.status = UploadStatus::Pending;
        Ok(entry.item.clone())
    }

    /// Drop an item. Returns it and whether it held the slot.
    ///
    /// # Errors
    ///
    /// `NotInQueue` when the id is unknown.
    pub fn remove(&mut self, id: &UploadId) -> Result<(UploadItem, bool), UploadError> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.item.id == id)
            .ok_or_else(|| UploadError::not_in_queue(id.to_string()))?;
        let entry = self.entries.remove(index);
        let was_active = entry.item.status.occupies_slot();
        Ok((entry.item, was_active))
    }

    /// Drop every completed item, returning their ids.
    pub fn clear_completed(&mut self) -> Vec<UploadId> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            let done = e.item.status == UploadStatus::Completed;
            if done {
                removed.push(e.item.id);
            }
            !done
        });
        removed
    }

    /// Clone of one item.
    #[must_use]
    pub fn get(&self, id: &UploadId) -> Option<UploadItem> {
        self.entries
            .iter()
            .find(|e| &e.item.id == id)
            .map(|e| e.item.clone())
    }

    /// Snapshot of every item in enqueue order.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot::from_items(self.entries.iter().map(|e| e.item.clone()).collect())
    }

    /// Whether no item is waiting, running, or scheduled to retry.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.entries.iter().all(|e| {
            !matches!(
                e.item.status,
                UploadStatus::Pending
                    | UploadStatus::Transforming
                    | UploadStatus::Transferring
                    | UploadStatus::Committing
                    | UploadStatus::Retrying { .. }
            )
        })
    }

    fn entry_mut(&mut self, id: &UploadId) -> Result<&mut QueueEntry, UploadError> {
        self.entries
            .iter_mut()
            .find(|e| &e.item.id == id)
            .ok_or_else(|| UploadError::not_in_queue(id.to_string()))
    }

    /// The entry for `id` if `epoch` still owns it and its status passes `accept`.
    fn owned_by(
        &mut self,
        id: &UploadId,
        epoch: u64,
        accept: impl Fn(UploadStatus) -> bool,
    ) -> Option<&mut QueueEntry> {
        self.entries
            .iter_mut()
            .find(|e| &e.item.id == id)
            .filter(|e| e.item.epoch == epoch && accept(e.item.status))
    }
}

/// Zero the rate fields of an item that is no longer moving.
///
/// Percent and byte count stay as last observed; only a new epoch resets them.
fn stop_clock(item: &mut UploadItem) {
    item.speed_bytes_per_sec = 0.0;
    item.eta_seconds = None;
}
