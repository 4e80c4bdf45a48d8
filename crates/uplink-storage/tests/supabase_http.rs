//! HTTP-level tests for the Supabase adapters against a mock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use uplink_core::{
    FileRecord, IdentityPort, MetadataStorePort, ObjectStorePort, ProgressCallback, PutObject,
    TransferStrategy, UploadError,
};
use uplink_storage::{
    RESUMABLE_CHUNK, SessionIdentity, SupabaseBackend, SupabaseConfig, SupabaseMetadataStore,
    SupabaseObjectStore,
};

const ANON_KEY: &str = "anon-key";
const TOKEN: &str = "access-token";

fn backend(server: &ServerGuard) -> SupabaseBackend {
    backend_with(server, |config| config)
}

fn backend_with(
    server: &ServerGuard,
    adjust: impl FnOnce(SupabaseConfig) -> SupabaseConfig,
) -> SupabaseBackend {
    let config = adjust(SupabaseConfig::new(server.url(), ANON_KEY));
    SupabaseBackend::connect(config).unwrap()
}

fn recorder() -> (ProgressCallback, Arc<AtomicU64>) {
    let seen = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |sent| {
        sink.fetch_max(sent, Ordering::SeqCst);
    });
    (callback, seen)
}

fn put(path: &str, body: Bytes, strategy: TransferStrategy) -> PutObject {
    PutObject {
        path: path.to_string(),
        body,
        content_type: "application/octet-stream".to_string(),
        strategy,
        auth_token: TOKEN.to_string(),
    }
}

fn record() -> FileRecord {
    FileRecord {
        owner_id: "u1".to_string(),
        name: "report.pdf".to_string(),
        size: 1234,
        content_type: "application/pdf".to_string(),
        remote_path: "u1/1700000000000-deadbeef.pdf".to_string(),
        folder_id: Some("folder-9".to_string()),
    }
}

// ── Object store: single request ───────────────────────────────────────────

#[tokio::test]
async fn single_request_streams_body_and_reports_progress() {
    let mut server = Server::new_async().await;
    let body = Bytes::from(vec![42u8; 200 * 1024]);
    let mock = server
        .mock("POST", "/storage/v1/object/user-files/u1/a.bin")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .match_header("apikey", ANON_KEY)
        .match_header("x-upsert", "false")
        .match_header("content-type", "application/octet-stream")
        .match_header("content-length", body.len().to_string().as_str())
        .with_status(200)
        .with_body(r#"{"Key":"user-files/u1/a.bin"}"#)
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    let (progress, seen) = recorder();
    assert!(store.reports_progress(TransferStrategy::SingleRequest));
    assert_ok!(
        store
            .put_object(put("u1/a.bin", body.clone(), TransferStrategy::SingleRequest), progress)
            .await
    );

    mock.assert_async().await;
    assert_eq!(seen.load(Ordering::SeqCst), body.len() as u64);
}

#[tokio::test]
async fn conflict_in_body_is_a_permanent_rejection() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/storage/v1/object/user-files/u1/a.txt")
        .with_status(400)
        .with_body(r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#)
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    let (progress, _) = recorder();
    let err = assert_err!(
        store
            .put_object(
                put("u1/a.txt", Bytes::from_static(b"hello"), TransferStrategy::SingleRequest),
                progress
            )
            .await
    );

    assert!(matches!(
        err,
        UploadError::ServerRejected {
            status_code: Some(409),
            permanent: true,
            ..
        }
    ));
    assert!(err.user_message().contains("already exists"));
}

#[tokio::test]
async fn server_error_is_retryable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/storage/v1/object/user-files/u1/a.txt")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    let (progress, _) = recorder();
    let err = assert_err!(
        store
            .put_object(
                put("u1/a.txt", Bytes::from_static(b"hello"), TransferStrategy::SingleRequest),
                progress
            )
            .await
    );
    assert!(err.is_retryable());
}

// ── Object store: multi-part ───────────────────────────────────────────────

#[tokio::test]
async fn resumable_upload_patches_fixed_size_chunks() {
    let mut server = Server::new_async().await;
    let total = RESUMABLE_CHUNK + 10;
    let body = Bytes::from(vec![9u8; total]);

    let create = server
        .mock("POST", "/storage/v1/upload/resumable")
        .match_header("tus-resumable", "1.0.0")
        .match_header("upload-length", total.to_string().as_str())
        .match_header(
            "upload-metadata",
            Matcher::Regex("bucketName dXNlci1maWxlcw==".to_string()),
        )
        .with_status(201)
        .with_header("location", "/storage/v1/upload/resumable/session-1")
        .create_async()
        .await;
    let first = server
        .mock("PATCH", "/storage/v1/upload/resumable/session-1")
        .match_header("upload-offset", "0")
        .match_header("content-type", "application/offset+octet-stream")
        .with_status(204)
        .with_header("upload-offset", RESUMABLE_CHUNK.to_string().as_str())
        .create_async()
        .await;
    let second = server
        .mock("PATCH", "/storage/v1/upload/resumable/session-1")
        .match_header("upload-offset", RESUMABLE_CHUNK.to_string().as_str())
        .with_status(204)
        .with_header("upload-offset", total.to_string().as_str())
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    assert!(store.reports_progress(TransferStrategy::Multipart));
    let (progress, seen) = recorder();
    assert_ok!(
        store
            .put_object(put("u1/big.bin", body, TransferStrategy::Multipart), progress)
            .await
    );

    create.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(seen.load(Ordering::SeqCst), total as u64);
}

#[tokio::test]
async fn resumable_upload_rejects_wrong_offset() {
    let mut server = Server::new_async().await;
    let _create = server
        .mock("POST", "/storage/v1/upload/resumable")
        .with_status(201)
        .with_header("location", "/storage/v1/upload/resumable/session-2")
        .create_async()
        .await;
    let _patch = server
        .mock("PATCH", "/storage/v1/upload/resumable/session-2")
        .with_status(204)
        .with_header("upload-offset", "3")
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    let (progress, _) = recorder();
    let err = assert_err!(
        store
            .put_object(
                put("u1/b.bin", Bytes::from_static(b"0123456789"), TransferStrategy::Multipart),
                progress
            )
            .await
    );
    assert!(matches!(err, UploadError::Network { .. }));
}

#[tokio::test]
async fn multipart_without_resumable_is_one_opaque_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/storage/v1/object/user-files/u1/c.bin")
        .match_header("cache-control", "max-age=3600")
        .with_status(200)
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend_with(&server, |c| c.with_resumable(false)));
    assert!(!store.reports_progress(TransferStrategy::Multipart));
    let (progress, seen) = recorder();
    assert_ok!(
        store
            .put_object(
                put("u1/c.bin", Bytes::from_static(b"payload"), TransferStrategy::Multipart),
                progress
            )
            .await
    );

    mock.assert_async().await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

// ── Object store: existence and signed URLs ────────────────────────────────

#[tokio::test]
async fn object_exists_maps_statuses() {
    let mut server = Server::new_async().await;
    let _present = server
        .mock("HEAD", "/storage/v1/object/user-files/u1/here.txt")
        .with_status(200)
        .create_async()
        .await;
    let _missing = server
        .mock("HEAD", "/storage/v1/object/user-files/u1/gone.txt")
        .with_status(400)
        .create_async()
        .await;
    let _broken = server
        .mock("HEAD", "/storage/v1/object/user-files/u1/err.txt")
        .with_status(500)
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    assert!(assert_ok!(store.object_exists("u1/here.txt", TOKEN).await));
    assert!(!assert_ok!(store.object_exists("u1/gone.txt", TOKEN).await));
    assert_err!(store.object_exists("u1/err.txt", TOKEN).await);
}

#[tokio::test]
async fn signed_url_is_made_absolute() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/storage/v1/object/sign/user-files/u1/a.txt")
        .match_body(Matcher::PartialJson(json!({ "expiresIn": 60 })))
        .with_status(200)
        .with_body(r#"{"signedURL":"/object/sign/user-files/u1/a.txt?token=abc"}"#)
        .create_async()
        .await;

    let store = SupabaseObjectStore::new(backend(&server));
    let url = assert_ok!(
        store
            .signed_download_url("u1/a.txt", Duration::from_secs(60), TOKEN)
            .await
    );
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/sign/user-files/u1/a.txt?token=abc",
            server.url()
        )
    );
}

// ── Metadata store ─────────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_insert_posts_file_row() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/rest/v1/files")
        .match_header("prefer", "return=minimal")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .match_body(Matcher::PartialJson(json!({
            "user_id": "u1",
            "name": "report.pdf",
            "size": 1234,
            "mime_type": "application/pdf",
            "storage_path": "u1/1700000000000-deadbeef.pdf",
            "folder_id": "folder-9"
        })))
        .with_status(201)
        .create_async()
        .await;

    let store = SupabaseMetadataStore::new(backend(&server));
    assert_ok!(store.insert_file_record(&record(), TOKEN).await);
    mock.assert_async().await;
}

#[tokio::test]
async fn metadata_duplicate_row_counts_as_committed() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/rest/v1/files")
        .with_status(409)
        .with_body(r#"{"code":"23505","message":"duplicate key value"}"#)
        .create_async()
        .await;

    let store = SupabaseMetadataStore::new(backend(&server));
    assert_ok!(store.insert_file_record(&record(), TOKEN).await);
}

#[tokio::test]
async fn metadata_failure_is_a_commit_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/rest/v1/files")
        .with_status(500)
        .with_body(r#"{"message":"database unavailable"}"#)
        .create_async()
        .await;

    let store = SupabaseMetadataStore::new(backend(&server));
    let err = assert_err!(store.insert_file_record(&record(), TOKEN).await);
    assert!(matches!(err, UploadError::MetadataCommit { .. }));
    assert!(!err.is_retryable());
}

// ── Session identity ───────────────────────────────────────────────────────

#[tokio::test]
async fn session_identity_resolves_user_once() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/auth/v1/user")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .with_status(200)
        .with_body(r#"{"id":"user-42","email":"a@example.com"}"#)
        .expect(1)
        .create_async()
        .await;

    let identity = SessionIdentity::new(backend(&server), Some(TOKEN.to_string()));
    for _ in 0..2 {
        let user = identity.current_user().await.expect("user");
        assert_eq!(user.id, "user-42");
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn session_identity_retries_after_failed_lookup() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/auth/v1/user")
        .with_status(401)
        .with_body(r#"{"message":"invalid JWT"}"#)
        .expect(2)
        .create_async()
        .await;

    let identity = SessionIdentity::new(backend(&server), Some(TOKEN.to_string()));
    assert!(identity.current_user().await.is_none());
    assert!(identity.current_user().await.is_none());
    mock.assert_async().await;
}
