//! Shared fakes for upload manager integration tests.
//!
//! The fakes are scriptable and record everything they are asked to do, so
//! tests can assert on what reached the "remote" side.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use uplink_core::{
    FileRecord, MetadataStorePort, ObjectStorePort, ProgressCallback, PutObject, QueueSnapshot,
    StaticIdentity, TransferStrategy, TransformConfig, UploadError, UploadEvent,
    UploadEventEmitterPort, UploadId, UploadManagerConfig, UploadPayload,
};
use uplink_upload::{UploadManagerDeps, UploadManagerImpl, UploadManagerPort, build_upload_manager};

// ── Object store ───────────────────────────────────────────────────

/// What the next `put_object` call does.
pub enum PutScript {
    Succeed,
    Fail(UploadError),
    /// Report half the bytes, then wait for the gate before finishing.
    Gate(Arc<Notify>),
}

pub struct FakeObjectStore {
    native_progress: bool,
    script: Mutex<VecDeque<PutScript>>,
    puts: Mutex<Vec<PutObject>>,
    objects: Mutex<HashSet<String>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::with_native_progress(true)
    }

    pub fn with_native_progress(native_progress: bool) -> Self {
        Self {
            native_progress,
            script: Mutex::new(VecDeque::new()),
            puts: Mutex::new(Vec::new()),
            objects: Mutex::new(HashSet::new()),
        }
    }

    /// Queue behaviours for upcoming puts; unscripted puts succeed.
    pub fn script(&self, steps: impl IntoIterator<Item = PutScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn puts(&self) -> Vec<PutObject> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStorePort for FakeObjectStore {
    fn reports_progress(&self, _strategy: TransferStrategy) -> bool {
        self.native_progress
    }

    async fn put_object(
        &self,
        request: PutObject,
        progress: ProgressCallback,
    ) -> Result<(), UploadError> {
        let len = request.body.len() as u64;
        let path = request.path.clone();
        self.puts.lock().unwrap().push(request);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PutScript::Succeed);

        progress(len / 2);
        match step {
            PutScript::Succeed => {}
            PutScript::Fail(error) => return Err(error),
            PutScript::Gate(gate) => gate.notified().await,
        }
        progress(len);
        self.objects.lock().unwrap().insert(path);
        Ok(())
    }

    async fn object_exists(&self, path: &str, _auth_token: &str) -> Result<bool, UploadError> {
        Ok(self.objects.lock().unwrap().contains(path))
    }

    async fn signed_download_url(
        &self,
        path: &str,
        ttl: Duration,
        _auth_token: &str,
    ) -> Result<String, UploadError> {
        Ok(format!("https://fake.invalid/{path}?ttl={}", ttl.as_secs()))
    }
}

// ── Metadata store ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMetadataStore {
    records: Mutex<Vec<FileRecord>>,
    failures: Mutex<VecDeque<UploadError>>,
    gates: Mutex<VecDeque<Arc<Notify>>>,
}

impl FakeMetadataStore {
    pub fn fail_next(&self, error: UploadError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Hold the next insert until `gate` is notified.
    pub fn gate_next(&self, gate: Arc<Notify>) {
        self.gates.lock().unwrap().push_back(gate);
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataStorePort for FakeMetadataStore {
    async fn insert_file_record(
        &self,
        record: &FileRecord,
        _auth_token: &str,
    ) -> Result<(), UploadError> {
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ── Event recorder ─────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<UploadEvent>>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every item snapshot emitted for `id`, in emission order.
    pub fn item_updates(&self, id: &UploadId) -> Vec<uplink_core::UploadItem> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UploadEvent::ItemChanged { item } if &item.id == id => Some(item),
                _ => None,
            })
            .collect()
    }
}

impl UploadEventEmitterPort for RecordingEmitter {
    fn emit(&self, event: UploadEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn UploadEventEmitterPort> {
        Box::new(self.clone())
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub manager: Arc<UploadManagerImpl>,
    pub store: Arc<FakeObjectStore>,
    pub metadata: Arc<FakeMetadataStore>,
    pub events: RecordingEmitter,
}

pub fn config() -> UploadManagerConfig {
    UploadManagerConfig::default().with_transform(TransformConfig::disabled())
}

pub fn harness() -> Harness {
    harness_with(FakeObjectStore::new(), StaticIdentity::new("user-1", "token-1"), config())
}

pub fn harness_with(
    store: FakeObjectStore,
    identity: StaticIdentity,
    config: UploadManagerConfig,
) -> Harness {
    let store = Arc::new(store);
    let metadata = Arc::new(FakeMetadataStore::default());
    let events = RecordingEmitter::default();
    let manager = build_upload_manager(UploadManagerDeps {
        object_store: Arc::clone(&store),
        metadata_store: Arc::clone(&metadata),
        identity: Arc::new(identity),
        event_emitter: Arc::new(events.clone()),
        config,
    });
    Harness {
        manager,
        store,
        metadata,
        events,
    }
}

pub fn text_payload(name: &str, len: usize) -> UploadPayload {
    UploadPayload::new(name, "text/plain", vec![b'x'; len])
}

/// A PNG of deterministic noise; it compresses badly, so the transform
/// has real work to do.
pub fn noise_png(name: &str, width: u32, height: u32) -> UploadPayload {
    let mut state: u32 = 0x9e37_79b9;
    let pixels = image::RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(pixels)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    UploadPayload::new(name, "image/png", bytes)
}

/// A manager config with the image transform at its default bounds.
pub fn transform_config() -> UploadManagerConfig {
    UploadManagerConfig::default()
}

/// Poll the queue until `pred` holds.
///
/// Sleeps between polls so paused-clock tests let timers fire.
pub async fn wait_for<F>(manager: &UploadManagerImpl, what: &str, pred: F) -> QueueSnapshot
where
    F: Fn(&QueueSnapshot) -> bool,
{
    for _ in 0..3000 {
        let snapshot = manager.snapshot().await;
        if pred(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}: {:#?}", manager.snapshot().await);
}

/// Status of `id` in `snapshot`, panicking if it is missing.
pub fn status_of(snapshot: &QueueSnapshot, id: &UploadId) -> uplink_core::UploadStatus {
    snapshot
        .get(id)
        .map(|item| item.status)
        .unwrap_or_else(|| panic!("{id} missing from snapshot"))
}
