//! Runs one job through background removal, flip and upload.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use db::{DbError, RecordStore};
use futures_util::future::join_all;
use image_core::{
    CompletedAssets, ImageFormat, ImageJob, ImageUpload, JobId, JobLifecycle, ProcessingMode,
    Stage,
};
use imaging::ImagingError;
use removal::{BackgroundRemover, RemovalRequest};
use storage::{AssetStore, StoredAsset, UploadOptions};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Asset folder both outputs are stored under.
    pub folder: String,
    /// Bounding box for optimized mode.
    pub optimized_max_dimension: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            folder: "image-pipeline".to_string(),
            optimized_max_dimension: imaging::DEFAULT_MAX_DIMENSION,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Ready(ImageJob),
    /// The job failed; the message is what was persisted (or would have been, if the
    /// record is gone).
    Failed(String),
    Cancelled,
}

/// Drives a job through its stages and records each transition.
///
/// All outcomes are persisted through the record store. Errors never escape
/// [`PipelineExecutor::execute`].
#[derive(Clone)]
pub struct PipelineExecutor {
    records: Arc<dyn RecordStore>,
    assets: Arc<dyn AssetStore>,
    remover: Arc<dyn BackgroundRemover>,
    settings: PipelineSettings,
}

impl PipelineExecutor {
    pub fn new(
        records: Arc<dyn RecordStore>,
        assets: Arc<dyn AssetStore>,
        remover: Arc<dyn BackgroundRemover>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            records,
            assets,
            remover,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn execute(
        &self,
        job: ImageJob,
        upload: ImageUpload,
        token: CancellationToken,
    ) -> ExecutionOutcome {
        let id = job.id;
        let mut stored = Vec::new();

        match self.run(job, upload, &token, &mut stored).await {
            Ok(job) => ExecutionOutcome::Ready(job),
            Err(PipelineError::Cancelled) => {
                // Anything uploaded before the cancel was seen is no longer referenced.
                self.compensate(id, &stored).await;
                tracing::info!("Job {} cancelled", id);
                ExecutionOutcome::Cancelled
            }
            Err(err) => {
                self.compensate(id, &stored).await;
                if token.is_cancelled() {
                    tracing::info!("Job {} cancelled ({})", id, err);
                    return ExecutionOutcome::Cancelled;
                }
                let message = err.to_string();
                tracing::warn!("Job {} failed: {}", id, message);
                self.mark_failed(id, &message).await;
                ExecutionOutcome::Failed(message)
            }
        }
    }

    async fn run(
        &self,
        job: ImageJob,
        upload: ImageUpload,
        token: &CancellationToken,
        stored: &mut Vec<StoredAsset>,
    ) -> Result<ImageJob, PipelineError> {
        let id = job.id;
        let mut lifecycle = JobLifecycle::for_job(&job);

        // Background removal
        checkpoint(token)?;
        self.records
            .update(id, lifecycle.begin(Stage::RemoveBackground)?)
            .await?;
        let started = Instant::now();
        let input = match job.mode {
            ProcessingMode::Optimized => {
                let max = self.settings.optimized_max_dimension;
                let bytes = upload.bytes.clone();
                match blocking(move || imaging::fit_within(&bytes, max)).await? {
                    Some(resized) => {
                        tracing::debug!("Job {}: input resized to fit {}px", id, max);
                        Bytes::from(resized)
                    }
                    None => upload.bytes.clone(),
                }
            }
            ProcessingMode::Original => upload.bytes.clone(),
        };
        let cutout = self
            .remover
            .remove_background(RemovalRequest {
                bytes: input,
                filename: upload.filename.clone(),
                mime_type: upload.mime_type.clone(),
            })
            .await?;
        let remove_bg_ms = elapsed_ms(started);
        tracing::debug!("Job {}: background removed in {}ms", id, remove_bg_ms);

        // Flip
        checkpoint(token)?;
        self.records
            .update(
                id,
                lifecycle
                    .begin(Stage::Flip)?
                    .with_remove_bg_ms(remove_bg_ms),
            )
            .await?;
        let started = Instant::now();
        let processed = Bytes::from(blocking(move || imaging::flip_horizontal_png(&cutout)).await?);
        let flip_ms = elapsed_ms(started);
        tracing::debug!("Job {}: flipped in {}ms", id, flip_ms);

        // Upload
        checkpoint(token)?;
        self.records
            .update(id, lifecycle.begin(Stage::Upload)?.with_flip_ms(flip_ms))
            .await?;
        let started = Instant::now();
        let original_options = UploadOptions {
            folder: self.settings.folder.clone(),
            name: format!("{id}-original"),
            format: ImageFormat::from_mime(&upload.mime_type).map(|f| f.extension().to_string()),
        };
        let original = self.store(upload.bytes.clone(), &original_options).await?;
        stored.push(original.clone());

        let processed_options =
            UploadOptions::new(self.settings.folder.clone(), format!("{id}-processed"))
                .with_format("png");
        let processed = self.store(processed, &processed_options).await?;
        stored.push(processed.clone());
        let upload_ms = elapsed_ms(started);

        checkpoint(token)?;
        let patch = lifecycle
            .complete(CompletedAssets {
                original_url: original.url,
                original_asset_id: original.asset_id,
                processed_url: processed.url,
                processed_asset_id: processed.asset_id,
            })?
            .with_upload_ms(upload_ms);
        let job = self.records.update(id, patch).await?;

        tracing::info!(
            job_id = %id,
            remove_bg_ms,
            flip_ms,
            upload_ms,
            "image_processed"
        );
        Ok(job)
    }

    async fn store(
        &self,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<StoredAsset, PipelineError> {
        self.assets
            .upload(bytes, options)
            .await
            .map_err(PipelineError::Upload)
    }

    /// Delete every asset this run stored. Failures are logged, not raised.
    async fn compensate(&self, id: JobId, stored: &[StoredAsset]) {
        if stored.is_empty() {
            return;
        }
        let deletions = stored.iter().map(|asset| async move {
            if let Err(e) = self.assets.delete(&asset.asset_id).await {
                tracing::warn!(
                    "Job {}: failed to delete asset {}: {}",
                    id,
                    asset.asset_id,
                    e
                );
            }
        });
        join_all(deletions).await;
        tracing::debug!("Job {}: removed {} stored asset(s)", id, stored.len());
    }

    /// Persist the failure from whatever position the stored record is at.
    async fn mark_failed(&self, id: JobId, message: &str) {
        let result = async {
            let Some(current) = self.records.get(id).await? else {
                return Err(DbError::NotFound(id));
            };
            let patch = JobLifecycle::for_job(&current).fail(message)?;
            self.records.update(id, patch).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Job {}: could not record failure: {}", id, e);
        }
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run an image transform on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, ImagingError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
        .map_err(PipelineError::from)
}
