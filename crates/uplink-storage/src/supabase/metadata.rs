//! Supabase REST implementation of `MetadataStorePort`.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use uplink_core::{FileRecord, MetadataStorePort, UploadError};

use super::client::SupabaseBackend;
use crate::error::{StorageError, StorageResult};

/// Inserts file rows through the PostgREST endpoint of the project.
#[derive(Debug, Clone)]
pub struct SupabaseMetadataStore {
    backend: SupabaseBackend,
}

/// Row shape of the files table.
#[derive(Debug, Serialize)]
struct FileRow<'a> {
    user_id: &'a str,
    name: &'a str,
    size: u64,
    mime_type: &'a str,
    storage_path: &'a str,
    folder_id: Option<&'a str>,
}

impl<'a> From<&'a FileRecord> for FileRow<'a> {
    fn from(record: &'a FileRecord) -> Self {
        Self {
            user_id: &record.owner_id,
            name: &record.name,
            size: record.size,
            mime_type: &record.content_type,
            storage_path: &record.remote_path,
            folder_id: record.folder_id.as_deref(),
        }
    }
}

impl SupabaseMetadataStore {
    /// Create a store over an existing connection.
    pub const fn new(backend: SupabaseBackend) -> Self {
        Self { backend }
    }

    async fn insert(&self, record: &FileRecord, auth_token: &str) -> StorageResult<()> {
        let url = self
            .backend
            .endpoint(["rest/v1", &self.backend.config().files_table])?;
        let request = self
            .backend
            .control(Method::POST, url, auth_token)
            .header("Prefer", "return=minimal")
            .json(&FileRow::from(record));

        match SupabaseBackend::send(request).await {
            Ok(_) => Ok(()),
            // A retried commit for a row that already landed.
            Err(StorageError::Http { status: 409, .. }) => {
                debug!(
                    target: "uplink.storage",
                    path = %record.remote_path,
                    "File record already present"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MetadataStorePort for SupabaseMetadataStore {
    async fn insert_file_record(
        &self,
        record: &FileRecord,
        auth_token: &str,
    ) -> Result<(), UploadError> {
        self.insert(record, auth_token)
            .await
            .map_err(|e| UploadError::metadata_commit(e.to_string()))
    }
}
