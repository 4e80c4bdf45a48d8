//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the upload queue expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No `reqwest` or filesystem types in any signature
//! - Every fallible call returns the classified `UploadError`
//! - Collaborators are consumed as `Arc<dyn Port>`

pub mod identity;
pub mod metadata_store;
pub mod object_store;
pub mod upload_event_emitter;
pub mod upload_manager;

pub use identity::{IdentityPort, StaticIdentity, UserIdentity};
pub use metadata_store::MetadataStorePort;
pub use object_store::{ObjectStorePort, ProgressCallback, PutObject, TransferStrategy};
pub use upload_event_emitter::{BroadcastUploadEmitter, NoopUploadEmitter, UploadEventEmitterPort};
pub use upload_manager::{TransformConfig, UploadManagerConfig, UploadManagerPort};
