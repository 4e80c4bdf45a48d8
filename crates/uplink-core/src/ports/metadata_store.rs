//! Metadata store port definition.
//!
//! After an object lands, the queue registers it as a file record so it
//! shows up in listings. This port keeps the queue decoupled from the
//! relational backend.

use async_trait::async_trait;

use crate::upload::{FileRecord, UploadError};

/// Port for registering uploaded files.
///
/// Registration of the same record must be idempotent: the queue may retry a
/// commit for an object that already landed.
#[async_trait]
pub trait MetadataStorePort: Send + Sync {
    /// Insert a file record.
    ///
    /// Implementations should return `UploadError::MetadataCommit` for
    /// backend failures.
    async fn insert_file_record(
        &self,
        record: &FileRecord,
        auth_token: &str,
    ) -> Result<(), UploadError>;
}
