//! Upload worker pipeline.
//!
//! Runs one attempt for one item: transform, transfer, commit. The worker
//! operates on value types and cloned Arc dependencies with no access to the
//! manager's queue lock.
//!
//! - Stage changes go out on an ordered `mpsc` channel (`JobPhase`)
//! - Byte progress goes out on a `watch` channel; only the latest matters
//! - Cancellation wraps every suspension point via `tokio::select!`

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use uplink_core::{
    FileRecord, MetadataStorePort, ObjectStorePort, UploadError, UploadId, UploadPayload,
};

use crate::executor::{ProgressSink, TransferExecutor, TransferProgress};
use crate::queue::{PreparedPayload, UncommittedUpload};
use crate::transform::TransformStage;

/// Dependencies for the upload worker.
#[derive(Clone)]
pub struct WorkerDeps {
    /// Image transform stage.
    pub transform: TransformStage,
    /// Transfer executor.
    pub executor: Arc<TransferExecutor>,
    /// Object store, for the commit-only existence check.
    pub object_store: Arc<dyn ObjectStorePort>,
    /// Metadata store for the commit step.
    pub metadata_store: Arc<dyn MetadataStorePort>,
}

/// Size change produced by the transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformReport {
    /// Bytes before.
    pub original_bytes: u64,
    /// Bytes after.
    pub transformed_bytes: u64,
}

/// Stage transition reported by the worker.
#[derive(Debug, Clone)]
pub enum JobPhase {
    /// The transform stage produced the payload to send.
    Transformed {
        /// Payload to send.
        prepared: PreparedPayload,
        /// Set when the transform changed the bytes.
        report: Option<TransformReport>,
    },
    /// Bytes are about to go on the wire.
    Transferring {
        /// Remote path for this attempt.
        remote_path: String,
    },
    /// The object landed; the metadata record is being written.
    Committing {
        /// The landed object.
        upload: UncommittedUpload,
    },
}

/// Progress update sent through the watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes sent (or estimated) so far.
    pub transferred: u64,
    /// Total bytes for this attempt.
    pub total: u64,
    /// Whether the numbers are simulated.
    pub simulated: bool,
    /// Monotonically increasing sequence number for change detection.
    pub seq: u64,
}

/// One attempt, as a value type with no references back to the manager.
pub struct UploadJob {
    /// Item id.
    pub id: UploadId,
    /// Attempt epoch.
    pub epoch: u64,
    /// Original payload.
    pub payload: UploadPayload,
    /// Transform output cached by an earlier attempt.
    pub prepared: Option<PreparedPayload>,
    /// Object an earlier attempt left without a record.
    pub uncommitted: Option<UncommittedUpload>,
    /// Cancellation token for this attempt.
    pub cancel: CancellationToken,
    /// Stage transitions.
    pub phase_tx: mpsc::UnboundedSender<JobPhase>,
    /// Byte progress.
    pub progress_tx: watch::Sender<ProgressUpdate>,
}

/// Result of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    /// Item id.
    pub id: UploadId,
    /// Record written to the metadata store.
    pub record: FileRecord,
    /// Whether the object from an earlier attempt was reused.
    pub reused_object: bool,
}

/// Run one attempt to completion.
///
/// Stage transitions are reported through `job.phase_tx` and progress
/// through `job.progress_tx`; no events are emitted here.
///
/// # Errors
///
/// `Cancelled` when `job.cancel` fires; otherwise the classified error from
/// the stage that failed. Any metadata-store failure surfaces as
/// `MetadataCommit` so it is never retried automatically.
pub async fn run_job(job: UploadJob, deps: &WorkerDeps) -> Result<CompletedJob, UploadError> {
    let prepared = match job.prepared.clone() {
        Some(prepared) => prepared,
        None => {
            let (prepared, report) = transform_payload(&job, deps).await?;
            let _ = job.phase_tx.send(JobPhase::Transformed {
                prepared: prepared.clone(),
                report,
            });
            prepared
        }
    };

    if let Some(prior) = &job.uncommitted {
        if let Some(done) = commit_prior_object(&job, prior, deps).await? {
            return Ok(done);
        }
    }

    let transfer = deps.executor.prepare(&job.payload.name, prepared.len()).await?;
    let _ = job.phase_tx.send(JobPhase::Transferring {
        remote_path: transfer.remote_path.clone(),
    });

    let sink = progress_sink(job.progress_tx.clone());
    deps.executor
        .execute(
            &transfer,
            prepared.bytes.clone(),
            &prepared.content_type,
            &job.cancel,
            &sink,
        )
        .await?;

    let upload = UncommittedUpload {
        remote_path: transfer.remote_path,
        owner_id: transfer.session.owner_id,
        size: prepared.len(),
        content_type: prepared.content_type,
    };
    let _ = job.phase_tx.send(JobPhase::Committing {
        upload: upload.clone(),
    });

    let record = commit(&job, &upload, &transfer.session.auth_token, deps).await?;
    Ok(CompletedJob {
        id: job.id,
        record,
        reused_object: false,
    })
}

/// Run the transform stage on the blocking pool.
async fn transform_payload(
    job: &UploadJob,
    deps: &WorkerDeps,
) -> Result<(PreparedPayload, Option<TransformReport>), UploadError> {
    let payload = &job.payload;
    let original = PreparedPayload {
        bytes: payload.bytes.clone(),
        content_type: payload.content_type.clone(),
    };
    if !deps.transform.applies_to(&payload.content_type) {
        return Ok((original, None));
    }

    let stage = deps.transform.clone();
    let bytes = payload.bytes.clone();
    let content_type = payload.content_type.clone();
    let task = tokio::task::spawn_blocking(move || stage.transform(&bytes, &content_type));

    let joined = tokio::select! {
        biased;
        () = job.cancel.cancelled() => return Err(UploadError::Cancelled),
        joined = task => joined,
    };

    let output = match joined {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(
                target: "uplink.upload",
                id = %job.id,
                error = %e,
                "Transform task failed, sending original bytes"
            );
            return Ok((original, None));
        }
    };

    let report = output.applied.then(|| TransformReport {
        original_bytes: payload.len(),
        transformed_bytes: output.len(),
    });
    Ok((
        PreparedPayload {
            bytes: output.bytes,
            content_type: output.content_type,
        },
        report,
    ))
}

/// Commit the object an earlier attempt left behind, if it is still there.
///
/// Returns `Ok(None)` when the object cannot be confirmed; the caller then
/// runs a full transfer.
async fn commit_prior_object(
    job: &UploadJob,
    prior: &UncommittedUpload,
    deps: &WorkerDeps,
) -> Result<Option<CompletedJob>, UploadError> {
    let session = deps.executor.session().await?;
    if session.owner_id != prior.owner_id {
        return Ok(None);
    }

    let exists = tokio::select! {
        biased;
        () = job.cancel.cancelled() => return Err(UploadError::Cancelled),
        exists = deps.object_store.object_exists(&prior.remote_path, &session.auth_token) => exists,
    };

    match exists {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => {
            tracing::warn!(
                target: "uplink.upload",
                id = %job.id,
                path = %prior.remote_path,
                error = %e,
                "Could not confirm earlier object, transferring again"
            );
            return Ok(None);
        }
    }

    tracing::info!(
        target: "uplink.upload",
        id = %job.id,
        path = %prior.remote_path,
        "Earlier object still present, committing only"
    );
    let _ = job.phase_tx.send(JobPhase::Committing {
        upload: prior.clone(),
    });
    let record = commit(job, prior, &session.auth_token, deps).await?;
    Ok(Some(CompletedJob {
        id: job.id,
        record,
        reused_object: true,
    }))
}

async fn commit(
    job: &UploadJob,
    upload: &UncommittedUpload,
    auth_token: &str,
    deps: &WorkerDeps,
) -> Result<FileRecord, UploadError> {
    let record = FileRecord {
        owner_id: upload.owner_id.clone(),
        name: job.payload.name.clone(),
        size: upload.size,
        content_type: upload.content_type.clone(),
        remote_path: upload.remote_path.clone(),
        folder_id: job.payload.folder_id.clone(),
    };

    let result = tokio::select! {
        biased;
        () = job.cancel.cancelled() => return Err(UploadError::Cancelled),
        result = deps.metadata_store.insert_file_record(&record, auth_token) => result,
    };

    match result {
        Ok(()) => Ok(record),
        Err(UploadError::Cancelled) => Err(UploadError::Cancelled),
        Err(e @ UploadError::MetadataCommit { .. }) => Err(e),
        Err(e) => Err(UploadError::metadata_commit(e.to_string())),
    }
}

fn progress_sink(tx: watch::Sender<ProgressUpdate>) -> ProgressSink {
    Arc::new(move |progress: TransferProgress| {
        // send_modify avoids clone and is infallible
        tx.send_modify(|state| {
            state.transferred = progress.transferred;
            state.total = progress.total;
            state.simulated = progress.simulated;
            state.seq += 1;
        });
    })
}
