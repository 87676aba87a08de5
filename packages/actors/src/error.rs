//! Error types for the pipeline, queue and service.

use db::DbError;
use image_core::{JobId, TransitionError, ValidationError};
use imaging::ImagingError;
use removal::RemovalError;
use storage::StorageError;
use thiserror::Error;

/// Why a pipeline run stopped short of `ready`.
///
/// The display text is what gets persisted as the job's `error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Removal(#[from] RemovalError),

    #[error("image processing failed: {0}")]
    Imaging(#[from] ImagingError),

    #[error("upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("record update failed: {0}")]
    Record(#[from] DbError),

    #[error("invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("worker task failed: {0}")]
    Task(String),
}

/// Work queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to start work queue: {0}")]
    Spawn(String),

    #[error("work queue is not running")]
    Stopped,

    #[error("work queue did not answer in time")]
    Timeout,
}

/// Errors surfaced by [`crate::ImageService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Record(#[from] DbError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
