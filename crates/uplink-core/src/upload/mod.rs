//! Upload domain types, events, errors, and snapshots.
//!
//! This module contains pure data types for the upload queue. No I/O,
//! networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `types` - Identifiers and payloads (`UploadId`, `UploadPayload`, `FileRecord`)
//! - `item` - Per-item observable state (`UploadItem`, `UploadStatus`)
//! - `events` - Upload events (`UploadEvent`)
//! - `errors` - Error types for upload operations
//! - `queue` - Queue snapshot DTO (`QueueSnapshot`)

pub mod errors;
pub mod events;
pub mod item;
pub mod queue;
pub mod types;

// Re-export commonly used types
pub use errors::{UploadError, UploadResult};
pub use events::UploadEvent;
pub use item::{UploadItem, UploadStatus};
pub use queue::QueueSnapshot;
pub use types::{FileRecord, UploadId, UploadPayload, is_image_type};
