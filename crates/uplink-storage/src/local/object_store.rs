//! Filesystem implementation of `ObjectStorePort`.
//!
//! Objects are written to a `.part` sibling first and linked into place, so
//! an interrupted transfer never leaves a partial object at the final path
//! and an existing object is never overwritten.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use uplink_core::{ObjectStorePort, ProgressCallback, PutObject, TransferStrategy, UploadError};

use crate::error::{StorageError, StorageResult};

/// Write granularity; progress is reported after each slice.
const WRITE_CHUNK: usize = 256 * 1024;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote path onto the root, rejecting anything that escapes it.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        let mut resolved = self.root.clone();
        let mut any = false;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    any = true;
                }
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidPath {
                        path: path.to_string(),
                    });
                }
            }
        }
        if any {
            Ok(resolved)
        } else {
            Err(StorageError::InvalidPath {
                path: path.to_string(),
            })
        }
    }

    async fn put(&self, request: &PutObject, progress: &ProgressCallback) -> StorageResult<()> {
        let target = self.resolve(&request.path)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(StorageError::AlreadyExists {
                path: request.path.clone(),
            });
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut part_name = target.as_os_str().to_owned();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        let mut file = tokio::fs::File::create(&part).await?;
        let mut written = 0u64;
        for chunk in request.body.chunks(WRITE_CHUNK) {
            file.write_all(chunk).await?;
            written += chunk.len() as u64;
            progress(written);
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let linked = tokio::fs::hard_link(&part, &target).await;
        let _ = tokio::fs::remove_file(&part).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists {
                    path: request.path.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn sign(&self, path: &str, ttl: Duration) -> StorageResult<String> {
        let target = self.resolve(path)?;
        let absolute = if target.is_absolute() {
            target
        } else {
            std::env::current_dir()?.join(target)
        };
        let url = Url::from_file_path(&absolute).map_err(|()| StorageError::InvalidPath {
            path: path.to_string(),
        })?;
        let expires = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(ttl)
            .as_secs();
        Ok(format!("{url}?expires={expires}"))
    }
}

#[async_trait]
impl ObjectStorePort for LocalObjectStore {
    fn reports_progress(&self, _strategy: TransferStrategy) -> bool {
        true
    }

    async fn put_object(
        &self,
        request: PutObject,
        progress: ProgressCallback,
    ) -> Result<(), UploadError> {
        debug!(
            target: "uplink.storage",
            path = %request.path,
            bytes = request.body.len(),
            "Writing object"
        );
        Ok(self.put(&request, &progress).await?)
    }

    async fn object_exists(&self, path: &str, _auth_token: &str) -> Result<bool, UploadError> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(target)
            .await
            .map_err(StorageError::from)?)
    }

    async fn signed_download_url(
        &self,
        path: &str,
        ttl: Duration,
        _auth_token: &str,
    ) -> Result<String, UploadError> {
        Ok(self.sign(path, ttl)?)
    }
}
