//! JSON-lines implementation of `MetadataStorePort`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use uplink_core::{FileRecord, MetadataStorePort, UploadError};

use crate::error::StorageResult;

/// Appends one JSON object per file record to a local file.
///
/// A record whose `remote_path` is already present is not written twice.
#[derive(Debug)]
pub struct JsonlMetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlMetadataStore {
    /// Store records in `path`. The file is created on first insert.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored record.
    pub async fn records(&self) -> StorageResult<Vec<FileRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    async fn append(&self, record: &FileRecord) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        if self
            .records()
            .await?
            .iter()
            .any(|existing| existing.remote_path == record.remote_path)
        {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStorePort for JsonlMetadataStore {
    async fn insert_file_record(
        &self,
        record: &FileRecord,
        _auth_token: &str,
    ) -> Result<(), UploadError> {
        self.append(record)
            .await
            .map_err(|e| UploadError::metadata_commit(e.to_string()))
    }
}
