//! Submission, polling and deletion of image jobs.

use std::sync::Arc;

use db::RecordStore;
use futures_util::future::join_all;
use image_core::{ImageJob, ImageUpload, JobId, JobLifecycle, UploadLimits};
use storage::AssetStore;

use crate::cache::CacheGate;
use crate::cancellation::CancellationRegistry;
use crate::error::ServiceError;
use crate::executor::{ExecutionOutcome, PipelineExecutor};
use crate::queue_actor::WorkQueue;

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A ready job for the same input and mode already exists.
    Cached(ImageJob),
    /// A new job was created and queued.
    Queued { job: ImageJob, queue_depth: usize },
    /// A new job was run inline; the record is in its terminal state.
    Completed(ImageJob),
}

impl SubmitOutcome {
    pub fn job(&self) -> &ImageJob {
        match self {
            SubmitOutcome::Cached(job)
            | SubmitOutcome::Queued { job, .. }
            | SubmitOutcome::Completed(job) => job,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SubmitOutcome::Cached(_))
    }
}

/// Entry point for everything a client can do with image jobs.
#[derive(Clone)]
pub struct ImageService {
    records: Arc<dyn RecordStore>,
    assets: Arc<dyn AssetStore>,
    executor: PipelineExecutor,
    queue: WorkQueue,
    cancellations: CancellationRegistry,
    cache: CacheGate,
    limits: UploadLimits,
}

impl ImageService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        assets: Arc<dyn AssetStore>,
        executor: PipelineExecutor,
        queue: WorkQueue,
        limits: UploadLimits,
    ) -> Self {
        Self {
            cache: CacheGate::new(records.clone()),
            records,
            assets,
            executor,
            queue,
            cancellations: CancellationRegistry::new(),
            limits,
        }
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Validate, consult the cache, and queue a new job on a miss.
    pub async fn submit(&self, upload: ImageUpload) -> Result<SubmitOutcome, ServiceError> {
        let job = match self.admit(&upload).await? {
            Admission::Cached(job) => return Ok(SubmitOutcome::Cached(job)),
            Admission::Created(job) => job,
        };

        let id = job.id;
        // Read the depth before handing the task over, so an error here leaves nothing
        // running. The new task adds one.
        let queue_depth = match self.queue.depth().await {
            Ok(depth) => depth.total() + 1,
            Err(e) => {
                self.abandon(id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        let token = self.cancellations.register(id);
        let executor = self.executor.clone();
        let registry = self.cancellations.clone();
        let task_job = job.clone();

        let enqueued = self.queue.enqueue(Some(id), async move {
            executor.execute(task_job, upload, token).await;
            registry.release(id);
        });
        if let Err(e) = enqueued {
            self.cancellations.release(id);
            self.abandon(id, &e.to_string()).await;
            return Err(e.into());
        }

        tracing::info!("Job {} queued (depth {})", id, queue_depth);
        Ok(SubmitOutcome::Queued { job, queue_depth })
    }

    /// Like [`ImageService::submit`], but runs the pipeline inline and returns the
    /// terminal record.
    pub async fn submit_sync(&self, upload: ImageUpload) -> Result<SubmitOutcome, ServiceError> {
        let job = match self.admit(&upload).await? {
            Admission::Cached(job) => return Ok(SubmitOutcome::Cached(job)),
            Admission::Created(job) => job,
        };

        let id = job.id;
        let token = self.cancellations.register(id);
        let outcome = self.executor.execute(job, upload, token).await;
        self.cancellations.release(id);

        match outcome {
            ExecutionOutcome::Ready(job) => Ok(SubmitOutcome::Completed(job)),
            ExecutionOutcome::Failed(_) | ExecutionOutcome::Cancelled => {
                let job = self.records.get(id).await?.ok_or(ServiceError::NotFound(id))?;
                Ok(SubmitOutcome::Completed(job))
            }
        }
    }

    pub async fn get(&self, id: JobId) -> Result<ImageJob, ServiceError> {
        self.records
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound(id))
    }

    /// Ready jobs, newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<ImageJob>, ServiceError> {
        Ok(self.records.list_ready(limit).await?)
    }

    /// Cancel the job if it is still live, remove the record and delete its stored assets.
    ///
    /// The record goes first. Its removed snapshot names the assets a finished run
    /// stored; a run that has not finished yet fails its next write and cleans up
    /// after itself.
    pub async fn delete(&self, id: JobId) -> Result<(), ServiceError> {
        if self.cancellations.cancel(id) && self.queue.cancel_pending(id).await? {
            tracing::debug!("Job {} withdrawn before it started", id);
        }

        let removed = self.records.delete(id).await?;
        self.cancellations.release(id);
        let job = removed.ok_or(ServiceError::NotFound(id))?;

        let deletions = job.asset_ids().into_iter().map(|asset_id| async move {
            if let Err(e) = self.assets.delete(&asset_id).await {
                tracing::warn!("Job {}: failed to delete asset {}: {}", id, asset_id, e);
            }
        });
        join_all(deletions).await;

        tracing::info!("Job {} deleted", id);
        Ok(())
    }

    /// Stop accepting queued work.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    async fn admit(&self, upload: &ImageUpload) -> Result<Admission, ServiceError> {
        upload.validate(&self.limits)?;

        let fingerprint = upload.fingerprint();
        if let Some(job) = self.cache.lookup(&fingerprint, upload.mode).await? {
            tracing::info!("Cache hit for {}: job {}", upload.filename, job.id);
            return Ok(Admission::Cached(job));
        }

        let job = self
            .records
            .create(ImageJob::queued(fingerprint, upload.mode))
            .await?;
        Ok(Admission::Created(job))
    }

    /// Fail a job that could not be handed to the queue.
    async fn abandon(&self, id: JobId, reason: &str) {
        let result = async {
            let patch = JobLifecycle::default().fail(reason)?;
            self.records.update(id, patch).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!("Job {}: could not record failure: {}", id, e);
        }
    }
}

enum Admission {
    Cached(ImageJob),
    Created(ImageJob),
}
