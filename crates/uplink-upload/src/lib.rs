#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by integration tests
#[cfg(test)]
use tokio_test as _;

// Re-export core types for convenience
pub use uplink_core::{
    FileRecord, QueueSnapshot, UploadError, UploadEvent, UploadId, UploadItem, UploadPayload,
    UploadStatus,
};
pub use uplink_core::ports::{
    IdentityPort, MetadataStorePort, ObjectStorePort, TransformConfig, UploadManagerConfig,
    UploadManagerPort,
};

pub mod executor;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod transform;

mod manager;

pub use executor::{PreparedTransfer, ProgressSink, Session, TransferExecutor, TransferProgress};
pub use manager::{
    CompletedJob, JobPhase, ProgressUpdate, TransformReport, UploadJob, UploadManagerDeps,
    UploadManagerImpl, WorkerDeps, build_upload_manager, run_job,
};
pub use progress::{ProgressEstimator, ProgressSample, SimulatedProgress};
pub use queue::{FailureOutcome, PreparedPayload, UncommittedUpload, UploadQueue};
pub use retry::{RetryDecision, RetryPolicy};
pub use transform::{TransformOutput, TransformStage};
