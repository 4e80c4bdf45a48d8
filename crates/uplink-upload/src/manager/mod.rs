//! Upload manager implementation.
//!
//! Concrete `UploadManagerPort` with a long-lived runner, lease-checked
//! finalization, and a clean split between the worker (pipeline logic) and
//! the bridge (queue updates and event emission).
//!
//! # Concurrency Model
//!
//! - Single long-lived runner; it runs one job at a time, which is what
//!   enforces the single transfer slot
//! - `Notify` wakes the runner when work may be available
//! - Every queue mutation carries the attempt epoch, so late reports from a
//!   cancelled attempt are dropped
//! - Lock order: queue → active (consistent everywhere)

mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use uplink_core::{
    IdentityPort, MetadataStorePort, ObjectStorePort, QueueSnapshot, UploadError, UploadEvent,
    UploadEventEmitterPort, UploadId, UploadItem, UploadManagerConfig, UploadManagerPort,
    UploadPayload,
};

use crate::executor::TransferExecutor;
use crate::progress::ProgressEstimator;
use crate::queue::{FailureOutcome, ProgressReport, StartedAttempt, UploadQueue};
use crate::retry::RetryPolicy;
use crate::transform::TransformStage;

pub use worker::{
    CompletedJob, JobPhase, ProgressUpdate, TransformReport, UploadJob, WorkerDeps, run_job,
};

/// Lease for the running attempt.
///
/// Guards finalization against a slot that was reassigned meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// The attempt holding the slot.
struct ActiveJob {
    lease: LeaseId,
    id: UploadId,
    cancel: CancellationToken,
}

/// Dependencies for creating an upload manager.
pub struct UploadManagerDeps<S, M, I, E>
where
    S: ObjectStorePort + 'static,
    M: MetadataStorePort + 'static,
    I: IdentityPort + 'static,
    E: UploadEventEmitterPort + 'static,
{
    /// Remote object store.
    pub object_store: Arc<S>,
    /// Metadata store for file records.
    pub metadata_store: Arc<M>,
    /// Identity/session provider.
    pub identity: Arc<I>,
    /// Port for emitting upload events.
    pub event_emitter: Arc<E>,
    /// Configuration for the upload manager.
    pub config: UploadManagerConfig,
}

/// Build an upload manager from its dependencies.
///
/// The runner is started lazily by the first operation that may create
/// work, so this can be called outside a runtime.
pub fn build_upload_manager<S, M, I, E>(deps: UploadManagerDeps<S, M, I, E>) -> Arc<UploadManagerImpl>
where
    S: ObjectStorePort + 'static,
    M: MetadataStorePort + 'static,
    I: IdentityPort + 'static,
    E: UploadEventEmitterPort + 'static,
{
    let object_store: Arc<dyn ObjectStorePort> = deps.object_store;
    let metadata_store: Arc<dyn MetadataStorePort> = deps.metadata_store;
    let identity: Arc<dyn IdentityPort> = deps.identity;
    let event_emitter: Arc<dyn UploadEventEmitterPort> = deps.event_emitter;
    let config = deps.config;

    let executor = Arc::new(TransferExecutor::new(
        Arc::clone(&object_store),
        identity,
        &config,
    ));
    let worker_deps = WorkerDeps {
        transform: TransformStage::new(config.transform.clone()),
        executor,
        object_store,
        metadata_store,
    };

    Arc::new_cyclic(|self_ref| UploadManagerImpl {
        event_emitter,
        worker_deps,
        retry: RetryPolicy::from_config(&config),
        queue: RwLock::new(UploadQueue::new(config.max_queue_size)),
        config,
        active: Mutex::new(None),
        lease_counter: AtomicU64::new(0),
        queue_notify: Notify::new(),
        runner_started: AtomicBool::new(false),
        prev_is_drained: Mutex::new(true),
        self_ref: self_ref.clone(),
    })
}

/// Concrete implementation of the upload manager.
///
/// Adapters should typically hold `Arc<dyn UploadManagerPort>` instead of
/// depending on this type directly.
pub struct UploadManagerImpl {
    event_emitter: Arc<dyn UploadEventEmitterPort>,
    worker_deps: WorkerDeps,
    retry: RetryPolicy,
    /// Item collection; the only place item state lives.
    queue: RwLock<UploadQueue>,
    config: UploadManagerConfig,
    /// Attempt the runner is executing.
    /// Lock order: always acquire queue lock before active lock.
    active: Mutex<Option<ActiveJob>>,
    lease_counter: AtomicU64,
    queue_notify: Notify,
    /// Never reset; the runner lives as long as the manager.
    runner_started: AtomicBool,
    prev_is_drained: Mutex<bool>,
    self_ref: Weak<Self>,
}

impl UploadManagerImpl {
    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &UploadManagerConfig {
        &self.config
    }

    /// Ensure the runner is started.
    ///
    /// Idempotent. The runner runs for the lifetime of the manager.
    pub fn ensure_runner(self: &Arc<Self>) {
        if self
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.run_loop().await;
            });
        }
    }

    /// Wake the runner, starting it if needed.
    fn wake_runner(&self) {
        self.queue_notify.notify_one();
        if let Some(manager) = self.self_ref.upgrade() {
            manager.ensure_runner();
        }
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            if let Some((lease, attempt, cancel)) = self.next_job().await {
                let id = attempt.item.id;
                let epoch = attempt.item.epoch;

                let (phase_tx, phase_rx) = mpsc::unbounded_channel();
                let (progress_tx, progress_rx) = watch::channel(ProgressUpdate::default());
                let bridge = self.spawn_progress_bridge(id, epoch, phase_rx, progress_rx);

                let job = UploadJob {
                    id,
                    epoch,
                    payload: attempt.payload,
                    prepared: attempt.prepared,
                    uncommitted: attempt.uncommitted,
                    cancel,
                    phase_tx,
                    progress_tx,
                };

                // The job (and its senders) is dropped when run_job returns,
                // which lets the bridge drain and exit.
                let result = worker::run_job(job, &self.worker_deps).await;
                if let Err(e) = bridge.await {
                    tracing::warn!(target: "uplink.upload", id = %id, error = %e, "Progress bridge panicked");
                }

                self.finalize_job(id, epoch, lease, result).await;
            } else {
                self.queue_notify.notified().await;
            }
        }
    }

    /// Claim the slot for the earliest pending item.
    ///
    /// Lock order: queue → active.
    async fn next_job(&self) -> Option<(LeaseId, StartedAttempt, CancellationToken)> {
        let (lease, attempt, cancel) = {
            let mut queue = self.queue.write().await;
            let id = queue.next_pending()?;
            let attempt = match queue.begin(&id) {
                Ok(attempt) => attempt,
                Err(e) => {
                    tracing::warn!(target: "uplink.upload", id = %id, error = %e, "Could not start upload");
                    return None;
                }
            };

            let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
            let cancel = CancellationToken::new();
            *self.active.lock().await = Some(ActiveJob {
                lease,
                id,
                cancel: cancel.clone(),
            });
            (lease, attempt, cancel)
        };

        tracing::info!(
            target: "uplink.upload",
            id = %attempt.item.id,
            name = %attempt.item.name,
            epoch = attempt.item.epoch,
            attempt = attempt.item.attempt_count + 1,
            "Starting upload"
        );
        self.emit(UploadEvent::item_changed(&attempt.item));
        self.emit_queue_snapshot().await;

        Some((lease, attempt, cancel))
    }

    /// Record the attempt's outcome.
    async fn finalize_job(
        &self,
        id: UploadId,
        epoch: u64,
        lease: LeaseId,
        result: Result<CompletedJob, UploadError>,
    ) {
        if !self.verify_and_clear_lease(lease).await {
            tracing::debug!(target: "uplink.upload", id = %id, "Ignoring stale finalize (lease mismatch)");
            return;
        }

        match result {
            Ok(completed) => self.handle_success(epoch, completed).await,
            Err(error) => self.handle_failure(id, epoch, &error).await,
        }

        self.emit_queue_snapshot().await;
    }

    async fn verify_and_clear_lease(&self, lease: LeaseId) -> bool {
        let mut active = self.active.lock().await;
        active
            .as_ref()
            .is_some_and(|job| job.lease == lease)
            .then(|| active.take())
            .is_some()
    }

    async fn handle_success(&self, epoch: u64, completed: CompletedJob) {
        let item = self.queue.write().await.complete(&completed.id, epoch);
        match item {
            Some(item) => {
                tracing::info!(
                    target: "uplink.upload",
                    id = %item.id,
                    path = %completed.record.remote_path,
                    size = completed.record.size,
                    reused_object = completed.reused_object,
                    "Upload completed"
                );
                self.emit(UploadEvent::item_changed(&item));
            }
            None => {
                tracing::debug!(
                    target: "uplink.upload",
                    id = %completed.id,
                    "Upload finished after its item was paused or removed"
                );
            }
        }
    }

    async fn handle_failure(&self, id: UploadId, epoch: u64, error: &UploadError) {
        let outcome = self
            .queue
            .write()
            .await
            .record_failure(&id, epoch, error, &self.retry);

        match outcome {
            FailureOutcome::Retry { item, delay } => {
                tracing::warn!(
                    target: "uplink.upload",
                    id = %id,
                    error = %error,
                    attempt = item.attempt_count,
                    max_attempts = item.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Upload failed, retry scheduled"
                );
                self.emit(UploadEvent::item_changed(&item));
                self.emit(UploadEvent::RetryScheduled {
                    id,
                    attempt: item.attempt_count,
                    max_attempts: item.max_attempts,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
                self.schedule_retry(id, epoch, delay);
            }
            FailureOutcome::Failed { item } => {
                tracing::warn!(
                    target: "uplink.upload",
                    id = %id,
                    error = %error,
                    attempts = item.attempt_count,
                    "Upload failed"
                );
                self.emit(UploadEvent::item_changed(&item));
            }
            FailureOutcome::Paused { item } => {
                tracing::info!(target: "uplink.upload", id = %id, "Upload cancelled");
                self.emit(UploadEvent::item_changed(&item));
            }
            FailureOutcome::Stale => {
                tracing::debug!(
                    target: "uplink.upload",
                    id = %id,
                    error = %error,
                    "Dropping result of abandoned attempt"
                );
            }
        }
    }

    /// Return the item to `Pending` once `delay` has passed.
    fn schedule_retry(&self, id: UploadId, epoch: u64, delay: Duration) {
        let manager = self.self_ref.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.on_retry_elapsed(id, epoch).await;
            }
        });
    }

    async fn on_retry_elapsed(&self, id: UploadId, epoch: u64) {
        let item = self.queue.write().await.retry_elapsed(&id, epoch);
        if let Some(item) = item {
            tracing::debug!(target: "uplink.upload", id = %id, "Retry delay elapsed");
            self.emit(UploadEvent::item_changed(&item));
            self.emit_queue_snapshot().await;
            self.wake_runner();
        }
    }

    /// Spawn the bridge that turns worker reports into queue updates.
    ///
    /// Stage transitions are applied as they arrive. Byte progress is
    /// sampled once per `progress_interval`, which is also the event rate.
    fn spawn_progress_bridge(
        self: &Arc<Self>,
        id: UploadId,
        epoch: u64,
        mut phase_rx: mpsc::UnboundedReceiver<JobPhase>,
        progress_rx: watch::Receiver<ProgressUpdate>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.config.progress_interval.max(Duration::from_millis(1));
        let alpha = self.config.ema_alpha;

        tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut estimator = ProgressEstimator::new(alpha);
            let mut last_seq = 0u64;

            loop {
                tokio::select! {
                    biased;

                    phase = phase_rx.recv() => {
                        let Some(phase) = phase else {
                            // Worker finished
                            break;
                        };
                        if matches!(phase, JobPhase::Transferring { .. }) {
                            estimator.begin(Instant::now().into_std());
                        }
                        manager.apply_phase(id, epoch, phase).await;
                    }

                    _ = tick.tick() => {
                        let current = *progress_rx.borrow();
                        if current.seq > last_seq {
                            last_seq = current.seq;
                            let sample = estimator.sample(
                                Instant::now().into_std(),
                                current.transferred,
                                current.total,
                            );
                            manager
                                .apply_progress(
                                    id,
                                    epoch,
                                    ProgressReport {
                                        bytes_transferred: current.transferred,
                                        percent: sample.percent,
                                        speed_bytes_per_sec: sample.speed_bytes_per_sec,
                                        eta_seconds: sample.eta_seconds,
                                        simulated: current.simulated,
                                    },
                                )
                                .await;
                        }
                    }
                }
            }
        })
    }

    async fn apply_phase(&self, id: UploadId, epoch: u64, phase: JobPhase) {
        let item = {
            let mut queue = self.queue.write().await;
            match phase {
                JobPhase::Transformed { prepared, report } => {
                    let item = queue.set_prepared(&id, epoch, prepared, report.is_some());
                    if let (Some(report), Some(_)) = (report, &item) {
                        self.emit(UploadEvent::transform_applied(
                            id,
                            report.original_bytes,
                            report.transformed_bytes,
                        ));
                    }
                    item
                }
                JobPhase::Transferring { remote_path } => {
                    queue.mark_transferring(&id, epoch, remote_path)
                }
                JobPhase::Committing { upload } => queue.mark_committing(&id, epoch, upload),
            }
        };
        if let Some(item) = item {
            self.emit(UploadEvent::item_changed(&item));
        }
    }

    async fn apply_progress(&self, id: UploadId, epoch: u64, report: ProgressReport) {
        let item = self.queue.write().await.apply_progress(&id, epoch, report);
        if let Some(item) = item {
            self.emit(UploadEvent::item_changed(&item));
        }
    }

    /// Cancel the running attempt if it belongs to `id`.
    ///
    /// Callers hold the queue lock (lock order: queue → active).
    async fn cancel_active(&self, id: &UploadId) {
        if let Some(job) = self.active.lock().await.as_ref() {
            if &job.id == id {
                job.cancel.cancel();
            }
        }
    }

    fn emit(&self, event: UploadEvent) {
        self.event_emitter.emit(event);
    }

    /// Emit a queue snapshot and handle drained/busy transitions.
    async fn emit_queue_snapshot(&self) {
        let (snapshot, is_drained) = {
            let queue = self.queue.read().await;
            (queue.snapshot(), queue.is_drained())
        };

        let mut prev = self.prev_is_drained.lock().await;
        let was_drained = *prev;
        *prev = is_drained;
        drop(prev);

        tracing::debug!(
            target: "uplink.upload",
            pending = snapshot.pending_count,
            completed = snapshot.completed_count,
            failed = snapshot.failed_count,
            is_drained,
            "Queue snapshot"
        );

        self.emit(UploadEvent::QueueSnapshot { snapshot });

        if !was_drained && is_drained {
            tracing::info!(target: "uplink.upload", "Upload queue drained");
            self.emit(UploadEvent::QueueDrained);
        }
    }
}

#[async_trait]
impl UploadManagerPort for UploadManagerImpl {
    async fn enqueue(&self, payloads: Vec<UploadPayload>) -> Result<Vec<UploadId>, UploadError> {
        let items = self.queue.write().await.enqueue(
            payloads,
            self.config.max_attempts,
            self.config.default_folder_id.as_deref(),
        )?;

        tracing::info!(target: "uplink.upload", count = items.len(), "Queued uploads");
        for item in &items {
            self.emit(UploadEvent::item_changed(item));
        }
        self.emit_queue_snapshot().await;
        self.wake_runner();

        Ok(items.into_iter().map(|item| item.id).collect())
    }

    async fn pause(&self, id: &UploadId) -> Result<(), UploadError> {
        let outcome = {
            let mut queue = self.queue.write().await;
            let outcome = queue.pause(id)?;
            if outcome.was_active {
                self.cancel_active(id).await;
            }
            outcome
        };

        tracing::info!(target: "uplink.upload", id = %id, was_active = outcome.was_active, "Upload paused");
        self.emit(UploadEvent::item_changed(&outcome.item));
        self.emit_queue_snapshot().await;
        self.wake_runner();
        Ok(())
    }

    async fn resume(&self, id: &UploadId) -> Result<(), UploadError> {
        let item = self.queue.write().await.resume(id)?;

        tracing::info!(target: "uplink.upload", id = %id, "Upload resumed");
        self.emit(UploadEvent::item_changed(&item));
        self.emit_queue_snapshot().await;
        self.wake_runner();
        Ok(())
    }

    async fn remove(&self, id: &UploadId) -> Result<(), UploadError> {
        {
            let mut queue = self.queue.write().await;
            let (_, was_active) = queue.remove(id)?;
            if was_active {
                self.cancel_active(id).await;
            }
        }

        tracing::info!(target: "uplink.upload", id = %id, "Upload removed");
        self.emit(UploadEvent::ItemRemoved { id: *id });
        self.emit_queue_snapshot().await;
        self.wake_runner();
        Ok(())
    }

    async fn clear_completed(&self) -> Result<usize, UploadError> {
        let removed = self.queue.write().await.clear_completed();
        for id in &removed {
            self.emit(UploadEvent::ItemRemoved { id: *id });
        }
        if !removed.is_empty() {
            self.emit_queue_snapshot().await;
        }
        Ok(removed.len())
    }

    async fn get(&self, id: &UploadId) -> Option<UploadItem> {
        self.queue.read().await.get(id)
    }

    async fn snapshot(&self) -> QueueSnapshot {
        self.queue.read().await.snapshot()
    }
}
