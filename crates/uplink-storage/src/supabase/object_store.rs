//! Supabase Storage implementation of `ObjectStorePort`.
//!
//! Single-request puts stream the body in small slices so byte-level
//! progress is reported as reqwest consumes it. Multi-part puts use the
//! resumable (TUS) endpoint and report progress per acknowledged chunk, or
//! go up as one opaque request when resumable uploads are disabled.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Method, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use uplink_core::{ObjectStorePort, ProgressCallback, PutObject, TransferStrategy, UploadError};

use super::client::SupabaseBackend;
use crate::error::{StorageError, StorageResult};

/// Slice size for streamed single-request bodies.
const STREAM_CHUNK: usize = 64 * 1024;

/// Chunk size the resumable endpoint requires for every chunk but the last.
pub const RESUMABLE_CHUNK: usize = 6 * 1024 * 1024;

const TUS_VERSION: &str = "1.0.0";

/// Object store backed by a Supabase Storage bucket.
#[derive(Debug, Clone)]
pub struct SupabaseObjectStore {
    backend: SupabaseBackend,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseObjectStore {
    /// Create a store over an existing connection.
    pub const fn new(backend: SupabaseBackend) -> Self {
        Self { backend }
    }

    fn object_url(&self, path: &str) -> StorageResult<Url> {
        self.backend
            .endpoint(["storage/v1/object", self.backend.config().bucket(), path])
    }

    fn cache_control(&self) -> String {
        format!("max-age={}", self.backend.config().cache_control_secs)
    }

    /// One POST whose body is fed to reqwest slice by slice.
    async fn put_streamed(
        &self,
        request: &PutObject,
        progress: ProgressCallback,
    ) -> StorageResult<()> {
        let url = self.object_url(&request.path)?;
        let body = Body::wrap_stream(counting_stream(request.body.clone(), progress));

        let builder = self
            .backend
            .request(Method::POST, url, &request.auth_token)
            .header(CONTENT_TYPE, &request.content_type)
            .header(CONTENT_LENGTH, request.body.len())
            .header("cache-control", self.cache_control())
            .header("x-upsert", "false")
            .body(body);

        SupabaseBackend::send(builder).await?;
        Ok(())
    }

    /// One POST with the whole body and no progress reporting.
    async fn put_opaque(&self, request: &PutObject) -> StorageResult<()> {
        let url = self.object_url(&request.path)?;
        let builder = self
            .backend
            .request(Method::POST, url, &request.auth_token)
            .header(CONTENT_TYPE, &request.content_type)
            .header("cache-control", self.cache_control())
            .header("x-upsert", "false")
            .body(request.body.clone());

        SupabaseBackend::send(builder).await?;
        Ok(())
    }

    /// Create a resumable upload, then PATCH it chunk by chunk.
    async fn put_resumable(
        &self,
        request: &PutObject,
        progress: ProgressCallback,
    ) -> StorageResult<()> {
        let config = self.backend.config();
        let create_url = self.backend.endpoint(["storage/v1/upload/resumable"])?;
        let metadata = upload_metadata(&[
            ("bucketName", config.bucket()),
            ("objectName", &request.path),
            ("contentType", &request.content_type),
            ("cacheControl", &config.cache_control_secs.to_string()),
        ]);

        let response = SupabaseBackend::send(
            self.backend
                .control(Method::POST, create_url.clone(), &request.auth_token)
                .header("Tus-Resumable", TUS_VERSION)
                .header("Upload-Length", request.body.len())
                .header("Upload-Metadata", metadata)
                .header("x-upsert", "false")
                .header(CONTENT_LENGTH, 0),
        )
        .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StorageError::InvalidResponse {
                message: "resumable upload created without a Location header".to_string(),
            })?;
        let upload_url = create_url.join(location)?;
        debug!(target: "uplink.storage", path = %request.path, %upload_url, "Resumable upload created");

        let mut offset = 0u64;
        for chunk in split(&request.body, RESUMABLE_CHUNK) {
            let expected = offset + chunk.len() as u64;
            let response = SupabaseBackend::send(
                self.backend
                    .request(Method::PATCH, upload_url.clone(), &request.auth_token)
                    .header("Tus-Resumable", TUS_VERSION)
                    .header("Upload-Offset", offset)
                    .header(CONTENT_TYPE, "application/offset+octet-stream")
                    .body(chunk),
            )
            .await?;

            let acknowledged = response
                .headers()
                .get("Upload-Offset")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .ok_or_else(|| StorageError::InvalidResponse {
                    message: "chunk acknowledged without an Upload-Offset header".to_string(),
                })?;
            if acknowledged != expected {
                return Err(StorageError::InvalidResponse {
                    message: format!("server acknowledged offset {acknowledged}, expected {expected}"),
                });
            }

            offset = acknowledged;
            progress(offset);
        }

        Ok(())
    }

    async fn exists(&self, path: &str, auth_token: &str) -> StorageResult<bool> {
        let url = self.object_url(path)?;
        let response = self
            .backend
            .control(Method::HEAD, url, auth_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => Ok(false),
            _ => Err(StorageError::from_response(response).await),
        }
    }

    async fn sign(&self, path: &str, ttl: Duration, auth_token: &str) -> StorageResult<String> {
        let url = self.backend.endpoint([
            "storage/v1/object/sign",
            self.backend.config().bucket(),
            path,
        ])?;
        let expires_in = ttl.as_secs().max(1);

        let response = SupabaseBackend::send(
            self.backend
                .control(Method::POST, url, auth_token)
                .json(&serde_json::json!({ "expiresIn": expires_in })),
        )
        .await?;
        let signed: SignedUrlResponse = serde_json::from_str(&response.text().await?)?;

        let storage_root = self.backend.endpoint(["storage/v1"])?;
        let full = format!(
            "{}/{}",
            storage_root.as_str().trim_end_matches('/'),
            signed.signed_url.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?.to_string())
    }
}

#[async_trait]
impl ObjectStorePort for SupabaseObjectStore {
    fn reports_progress(&self, strategy: TransferStrategy) -> bool {
        match strategy {
            TransferStrategy::SingleRequest => true,
            TransferStrategy::Multipart => self.backend.config().resumable,
        }
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
            strategy = ?request.strategy,
            "Putting object"
        );

        let result = match request.strategy {
            TransferStrategy::SingleRequest => self.put_streamed(&request, progress).await,
            TransferStrategy::Multipart if self.backend.config().resumable => {
                self.put_resumable(&request, progress).await
            }
            TransferStrategy::Multipart => self.put_opaque(&request).await,
        };
        Ok(result?)
    }

    async fn object_exists(&self, path: &str, auth_token: &str) -> Result<bool, UploadError> {
        Ok(self.exists(path, auth_token).await?)
    }

    async fn signed_download_url(
        &self,
        path: &str,
        ttl: Duration,
        auth_token: &str,
    ) -> Result<String, UploadError> {
        Ok(self.sign(path, ttl, auth_token).await?)
    }
}

/// Split a body into cheap reference-counted slices.
fn split(body: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..body.len())
        .step_by(chunk_size)
        .map(|start| body.slice(start..(start + chunk_size).min(body.len())))
        .collect()
}

/// Stream a body, reporting the cumulative byte count as slices are pulled.
fn counting_stream(
    body: Bytes,
    progress: ProgressCallback,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let mut sent = 0u64;
    stream::iter(split(&body, STREAM_CHUNK)).map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent);
        Ok(chunk)
    })
}

/// Encode TUS `Upload-Metadata`: comma-separated `key base64(value)` pairs.
fn upload_metadata(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key} {}", BASE64.encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}
