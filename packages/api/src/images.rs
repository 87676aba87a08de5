//! Submission, polling, listing and deletion of image jobs.

use actors::{ImageService, ServiceError, SubmitOutcome};
use bytes::Bytes;
use image_core::{ImageJob, ImageUpload, JobId, ProcessingMode};
use serde::Serialize;
use thiserror::Error;

/// Page size for [`ImageApi::list`] when none is given.
pub const DEFAULT_LIST_LIMIT: usize = 25;
/// Largest page [`ImageApi::list`] returns.
pub const MAX_LIST_LIMIT: usize = 100;

/// Boundary errors, each carrying the status code a router should answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    /// JSON error body: `{ "error": "<message>" }`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(e) => ApiError::BadRequest(e.to_string()),
            ServiceError::NotFound(_) => ApiError::NotFound("Job not found".to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

/// An image upload as it arrives from a client.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub mime_type: String,
    /// Raw mode value; `original` selects original mode, anything else optimized.
    pub mode: Option<String>,
    /// Run the pipeline inline and answer with the terminal record.
    pub sync: bool,
}

impl SubmitRequest {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: None,
            mime_type: mime_type.into(),
            mode: None,
            sync: false,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    fn into_upload(self) -> ImageUpload {
        let mode = ProcessingMode::from_form_value(self.mode.as_deref());
        ImageUpload::new(
            self.bytes,
            self.filename.unwrap_or_default(),
            self.mime_type,
            mode,
        )
    }
}

/// The job record, plus `cached` on a cache hit or `queue_depth` when queued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub job: ImageJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Cached(job) => Self {
                job,
                cached: Some(true),
                queue_depth: None,
            },
            SubmitOutcome::Queued { job, queue_depth } => Self {
                job,
                cached: None,
                queue_depth: Some(queue_depth),
            },
            SubmitOutcome::Completed(job) => Self {
                job,
                cached: None,
                queue_depth: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResponse {
    pub id: JobId,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// What a routing layer calls into.
#[derive(Clone)]
pub struct ImageApi {
    service: ImageService,
}

impl ImageApi {
    pub fn new(service: ImageService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ImageService {
        &self.service
    }

    /// Submit an image. Invalid input is rejected before any job exists.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, ApiError> {
        let sync = request.sync;
        let upload = request.into_upload();
        let outcome = if sync {
            self.service.submit_sync(upload).await?
        } else {
            self.service.submit(upload).await?
        };
        Ok(outcome.into())
    }

    /// Current record for `id`. Unknown and malformed ids are both not found.
    pub async fn status(&self, id: &str) -> Result<ImageJob, ApiError> {
        let id = parse_id(id)?;
        Ok(self.service.get(id).await?)
    }

    /// Ready jobs, newest first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<ImageJob>, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.service.list(limit).await?)
    }

    /// Cancel the job if it is still running, delete its assets and remove it.
    pub async fn delete(&self, id: &str) -> Result<DeleteResponse, ApiError> {
        let id = parse_id(id)?;
        self.service.delete(id).await?;
        Ok(DeleteResponse { id, deleted: true })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse { status: "ok" }
    }

    /// Stop the work queue. Jobs already running finish on their own.
    pub fn shutdown(&self) {
        self.service.shutdown();
    }
}

fn parse_id(id: &str) -> Result<JobId, ApiError> {
    JobId::parse(id.trim()).map_err(|_| ApiError::NotFound("Job not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_core::{Fingerprint, ValidationError};

    fn job() -> ImageJob {
        ImageJob::queued(
            Fingerprint::compute(b"img", ProcessingMode::Optimized),
            ProcessingMode::Optimized,
        )
    }

    #[test]
    fn error_status_codes() {
        let bad: ApiError = ServiceError::Validation(ValidationError::Empty).into();
        assert_eq!(bad.status_code(), 400);
        assert_eq!(bad.body(), serde_json::json!({ "error": "Missing image file" }));

        let missing: ApiError = ServiceError::NotFound(JobId::new()).into();
        assert_eq!(missing.status_code(), 404);
        assert_eq!(missing.to_string(), "Job not found");

        let queue: ApiError = ServiceError::Queue(actors::QueueError::Stopped).into();
        assert_eq!(queue.status_code(), 500);
    }

    #[test]
    fn cached_response_is_flat() {
        let job = job();
        let response = SubmitResponse::from(SubmitOutcome::Cached(job.clone()));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], serde_json::json!(job.id.to_string()));
        assert_eq!(value["status"], "queued");
        assert_eq!(value["cached"], true);
        assert!(value.get("queue_depth").is_none());
    }

    #[test]
    fn queued_response_carries_depth() {
        let response = SubmitResponse::from(SubmitOutcome::Queued {
            job: job(),
            queue_depth: 3,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["queue_depth"], 3);
        assert!(value.get("cached").is_none());
    }

    #[test]
    fn request_defaults() {
        let upload = SubmitRequest::new(&b"x"[..], "image/png").into_upload();
        assert_eq!(upload.filename, "upload");
        assert_eq!(upload.mode, ProcessingMode::Optimized);

        let upload = SubmitRequest::new(&b"x"[..], "image/png")
            .with_filename("cat.png")
            .with_mode("original")
            .into_upload();
        assert_eq!(upload.filename, "cat.png");
        assert_eq!(upload.mode, ProcessingMode::Original);
    }

    #[test]
    fn malformed_id_is_not_found() {
        let err = parse_id("not-a-ulid").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
