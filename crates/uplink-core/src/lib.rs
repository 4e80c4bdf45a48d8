#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod ports;
pub mod upload;

// Re-export commonly used types for convenience
pub use ports::{
    BroadcastUploadEmitter, IdentityPort, MetadataStorePort, NoopUploadEmitter, ObjectStorePort,
    ProgressCallback, PutObject, StaticIdentity, TransferStrategy, TransformConfig,
    UploadEventEmitterPort, UploadManagerConfig, UploadManagerPort, UserIdentity,
};
pub use upload::{
    FileRecord, QueueSnapshot, UploadError, UploadEvent, UploadId, UploadItem, UploadPayload,
    UploadResult, UploadStatus, is_image_type,
};

