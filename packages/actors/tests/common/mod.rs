#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use actors::{ImageService, PipelineExecutor, PipelineSettings, WorkQueue};
use db::{DbError, MemoryRecordStore, RecordStore};
use image_core::{
    Fingerprint, ImageJob, ImageUpload, JobId, JobPatch, JobStatus, JobStep, ProcessingMode,
    UploadLimits,
};
use removal::{BackgroundRemover, RemovalError, RemovalRequest, Sleeper};
use storage::{AssetStore, Storage, StorageConfig, StorageError, StoredAsset, UploadOptions};

/// A small PNG with a red left half and a blue right half.
pub fn png(w: u32, h: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_fn(w, h, |x, _| {
        if x < w / 2 {
            image::Rgba([255, 0, 0, 255])
        } else {
            image::Rgba([0, 0, 255, 255])
        }
    }));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Distinct PNG inputs; `seed` changes the width so the bytes differ.
pub fn upload(seed: u32, mode: ProcessingMode) -> ImageUpload {
    ImageUpload::new(png(4 + seed * 2, 4), "photo.png", "image/png", mode)
}

/// Background remover that fails with scripted statuses, then returns a PNG.
pub struct ScriptedRemover {
    failures: Mutex<VecDeque<u16>>,
    output: Bytes,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    requests: Mutex<Vec<Bytes>>,
    pub entered: Notify,
}

impl ScriptedRemover {
    pub fn ok() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            output: Bytes::from(png(6, 4)),
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            delay: Duration::ZERO,
            gate: None,
            requests: Mutex::new(Vec::new()),
            entered: Notify::new(),
        }
    }

    pub fn failing_with(statuses: &[u16]) -> Self {
        let remover = Self::ok();
        remover.failures.lock().extend(statuses.iter().copied());
        remover
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call waits on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Bytes received by each call, in order.
    pub fn requests(&self) -> Vec<Bytes> {
        self.requests.lock().clone()
    }
}

impl BackgroundRemover for ScriptedRemover {
    fn remove_background(
        &self,
        request: RemovalRequest,
    ) -> BoxFuture<'_, Result<Bytes, RemovalError>> {
        async move {
            self.requests.lock().push(request.bytes);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            self.entered.notify_one();

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.current.fetch_sub(1, Ordering::SeqCst);
            match self.failures.lock().pop_front() {
                Some(status) => Err(RemovalError::Status {
                    status,
                    message: format!("scripted {status}"),
                }),
                None => Ok(self.output.clone()),
            }
        }
        .boxed()
    }
}

/// In-memory asset storage that counts calls and can fail the n-th upload.
pub struct RecordingAssets {
    inner: Storage,
    uploads: AtomicUsize,
    fail_on_upload: Option<usize>,
    pub deleted: Mutex<Vec<String>>,
}

impl RecordingAssets {
    pub async fn new(fail_on_upload: Option<usize>) -> Self {
        Self {
            inner: Storage::new(StorageConfig::memory()).await.unwrap(),
            uploads: AtomicUsize::new(0),
            fail_on_upload,
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub async fn exists(&self, asset_id: &str) -> bool {
        self.inner.exists(asset_id).await.unwrap()
    }

    pub async fn fetch(&self, asset_id: &str) -> Bytes {
        self.inner.get_bytes(asset_id).await.unwrap()
    }
}

impl AssetStore for RecordingAssets {
    fn upload<'a>(
        &'a self,
        bytes: Bytes,
        options: &'a UploadOptions,
    ) -> BoxFuture<'a, Result<StoredAsset, StorageError>> {
        async move {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_upload == Some(n) {
                return Err(StorageError::InvalidConfig("simulated outage".into()));
            }
            self.inner.upload(bytes, options).await
        }
        .boxed()
    }

    fn delete<'a>(&'a self, asset_id: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            self.deleted.lock().push(asset_id.to_string());
            AssetStore::delete(&self.inner, asset_id).await
        }
        .boxed()
    }
}

/// Memory record store that remembers every successful update.
#[derive(Default)]
pub struct ObservedRecords {
    inner: MemoryRecordStore,
    history: Mutex<Vec<(JobId, JobStatus, JobStep)>>,
    hold_ready: Option<ReadyHold>,
}

/// Parks every `ready` write until released.
pub struct ReadyHold {
    /// Signalled when a `ready` write arrives.
    pub reached: Arc<Notify>,
    /// Lets the parked write through.
    pub release: Arc<Notify>,
}

impl ObservedRecords {
    pub fn holding_ready(hold: ReadyHold) -> Self {
        Self {
            hold_ready: Some(hold),
            ..Self::default()
        }
    }

    /// (status, step) after each update of `id`, in order.
    pub fn history(&self, id: JobId) -> Vec<(JobStatus, JobStep)> {
        self.history
            .lock()
            .iter()
            .filter(|(job_id, _, _)| *job_id == id)
            .map(|(_, status, step)| (*status, *step))
            .collect()
    }

    /// (status, step) after every update of any job, in order.
    pub fn all_updates(&self) -> Vec<(JobStatus, JobStep)> {
        self.history
            .lock()
            .iter()
            .map(|(_, status, step)| (*status, *step))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

impl RecordStore for ObservedRecords {
    fn create(&self, job: ImageJob) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        self.inner.create(job)
    }

    fn update(&self, id: JobId, patch: JobPatch) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        async move {
            if let Some(hold) = &self.hold_ready
                && patch.status == Some(JobStatus::Ready)
            {
                hold.reached.notify_one();
                hold.release.notified().await;
            }
            let job = self.inner.update(id, patch).await?;
            self.history.lock().push((id, job.status, job.step));
            Ok(job)
        }
        .boxed()
    }

    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        self.inner.get(id)
    }

    fn find_ready_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        mode: ProcessingMode,
    ) -> BoxFuture<'a, Result<Option<ImageJob>, DbError>> {
        self.inner.find_ready_by_fingerprint(fingerprint, mode)
    }

    fn list_ready(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ImageJob>, DbError>> {
        self.inner.list_ready(limit)
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        self.inner.delete(id)
    }
}

/// Sleeper that returns immediately.
pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        futures_util::future::ready(()).boxed()
    }
}

pub struct Harness {
    pub service: ImageService,
    pub records: Arc<ObservedRecords>,
    pub assets: Arc<RecordingAssets>,
}

pub async fn harness(
    concurrency: usize,
    remover: Arc<dyn BackgroundRemover>,
    assets: RecordingAssets,
) -> Harness {
    harness_with_records(concurrency, remover, assets, ObservedRecords::default()).await
}

pub async fn harness_with_records(
    concurrency: usize,
    remover: Arc<dyn BackgroundRemover>,
    assets: RecordingAssets,
    records: ObservedRecords,
) -> Harness {
    let records = Arc::new(records);
    let assets = Arc::new(assets);
    let executor = PipelineExecutor::new(
        records.clone(),
        assets.clone(),
        remover,
        PipelineSettings::default(),
    );
    let (queue, _handle) = WorkQueue::start(concurrency).await.unwrap();
    let service = ImageService::new(
        records.clone(),
        assets.clone(),
        executor,
        queue,
        UploadLimits::default(),
    );
    Harness {
        service,
        records,
        assets,
    }
}

/// Poll until the job is ready or failed.
pub async fn wait_terminal(service: &ImageService, id: JobId) -> ImageJob {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = service.get(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state")
}

/// Poll until the queue is empty.
pub async fn wait_idle(service: &ImageService) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while service.queue().depth().await.unwrap().total() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue did not drain");
}
