//! Startup wiring for the image pipeline.

use std::sync::Arc;

use actors::{ImageService, PipelineExecutor, PipelineSettings, QueueError, WorkQueue};
use db::repositories::JobRepository;
use db::{DbConfig, DbError, RecordStore};
use image_core::UploadLimits;
use removal::{BackgroundRemover, RemovalError, RemoveBgClient};
use storage::{AssetStore, Storage, StorageError};
use thiserror::Error;

use crate::config::AppConfig;
use crate::images::ImageApi;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("record store: {0}")]
    Db(#[from] DbError),

    #[error("asset store: {0}")]
    Storage(#[from] StorageError),

    #[error("removal client: {0}")]
    Removal(#[from] RemovalError),

    #[error("work queue: {0}")]
    Queue(#[from] QueueError),
}

/// Connect the record and asset stores, build the removal client and start the work queue.
///
/// This should be called once at startup before handling requests.
pub async fn init_image_api(config: AppConfig) -> Result<ImageApi, InitError> {
    tracing::info!("Initializing image pipeline...");

    let db_config = DbConfig::from_path(config.database_path.as_deref());
    let db = db::init(db_config).await?;
    let records: Arc<dyn RecordStore> = Arc::new(JobRepository::new(db));

    let storage = Storage::new(config.storage.clone()).await?;
    tracing::info!("Asset store ready ({})", storage.kind_str());
    let assets: Arc<dyn AssetStore> = Arc::new(storage);

    let remover: Arc<dyn BackgroundRemover> = Arc::new(
        RemoveBgClient::new(config.remove_bg_api_key.as_str())?
            .with_base_url(config.remove_bg_url.as_str())
            .with_retry_policy(config.retry),
    );

    let (queue, _handle) = WorkQueue::start(config.concurrency).await?;

    let settings = PipelineSettings {
        folder: config.upload_folder.clone(),
        optimized_max_dimension: config.optimized_max_dimension,
    };
    let executor = PipelineExecutor::new(records.clone(), assets.clone(), remover, settings);
    let limits = UploadLimits {
        max_bytes: config.max_upload_bytes,
    };
    let service = ImageService::new(records, assets, executor, queue, limits);

    tracing::info!(
        "Image pipeline initialized (concurrency {}, folder {})",
        config.concurrency,
        config.upload_folder
    );
    Ok(ImageApi::new(service))
}
