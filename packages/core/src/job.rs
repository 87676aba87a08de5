//! Job record types for image transformation requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::Fingerprint;
use crate::lifecycle::TransitionError;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse lifecycle status of a job, as seen by polling clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker slot.
    #[default]
    Queued,
    /// Job is running one of the pipeline stages.
    Processing,
    /// Job finished and both assets are stored.
    Ready,
    /// Job failed; `error` carries the reason.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Ready | JobStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained pipeline position. Steps only ever move forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    #[default]
    Queued,
    RemovingBackground,
    Flipping,
    Uploading,
    Done,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Queued => "queued",
            JobStep::RemovingBackground => "removing_background",
            JobStep::Flipping => "flipping",
            JobStep::Uploading => "uploading",
            JobStep::Done => "done",
        }
    }
}

impl std::fmt::Display for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the input is prepared before background removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Shrink large inputs before the external call.
    #[default]
    Optimized,
    /// Send the input bytes untouched.
    Original,
}

impl ProcessingMode {
    /// Parse a client-supplied mode. Only the literal `original` selects original mode.
    pub fn from_form_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("original") => ProcessingMode::Original,
            _ => ProcessingMode::Optimized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Optimized => "optimized",
            ProcessingMode::Original => "original",
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locations of both stored assets, required to mark a job ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAssets {
    pub original_url: String,
    pub original_asset_id: String,
    pub processed_url: String,
    pub processed_asset_id: String,
}

/// Durable record of one image transformation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJob {
    /// Unique identifier for this job.
    pub id: JobId,
    pub status: JobStatus,
    pub step: JobStep,
    pub original_url: Option<String>,
    pub processed_url: Option<String>,
    pub original_asset_id: Option<String>,
    pub processed_asset_id: Option<String>,
    /// Cache key over the input bytes and mode.
    pub fingerprint: Option<Fingerprint>,
    pub mode: ProcessingMode,
    /// Human-readable failure reason, set only when failed.
    pub error: Option<String>,
    pub remove_bg_ms: Option<u64>,
    pub flip_ms: Option<u64>,
    pub upload_ms: Option<u64>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
}

impl ImageJob {
    /// Create a new queued job for the given cache key.
    pub fn queued(fingerprint: Fingerprint, mode: ProcessingMode) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            step: JobStep::Queued,
            original_url: None,
            processed_url: None,
            original_asset_id: None,
            processed_asset_id: None,
            fingerprint: Some(fingerprint),
            mode,
            error: None,
            remove_bg_ms: None,
            flip_ms: None,
            upload_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Asset ids that are durably stored for this job.
    pub fn asset_ids(&self) -> Vec<String> {
        [&self.original_asset_id, &self.processed_asset_id]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Check the record-level invariants between status, step, outputs and error.
    pub fn is_consistent(&self) -> bool {
        let outputs_set = self.original_url.is_some()
            && self.processed_url.is_some()
            && self.original_asset_id.is_some()
            && self.processed_asset_id.is_some();
        let ready_ok = (self.status == JobStatus::Ready)
            == (outputs_set && self.step == JobStep::Done && self.error.is_none());
        let failed_ok = (self.status == JobStatus::Failed)
            == (self.error.is_some() && self.step == JobStep::Done);
        ready_ok && failed_ok
    }
}

/// Explicit partial update of a job record. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<JobStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_bg_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_ms: Option<u64>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        *self == JobPatch::default()
    }

    /// Record the background-removal duration.
    pub fn with_remove_bg_ms(mut self, ms: u64) -> Self {
        self.remove_bg_ms = Some(ms);
        self
    }

    /// Record the flip duration.
    pub fn with_flip_ms(mut self, ms: u64) -> Self {
        self.flip_ms = Some(ms);
        self
    }

    /// Record the upload duration.
    pub fn with_upload_ms(mut self, ms: u64) -> Self {
        self.upload_ms = Some(ms);
        self
    }

    /// Apply this patch to a record, rejecting writes that would break the lifecycle.
    ///
    /// Terminal records are immutable and neither `status` nor `step` may move backward.
    pub fn apply_to(&self, job: &mut ImageJob) -> Result<(), TransitionError> {
        if job.status.is_terminal() {
            return Err(TransitionError::Terminal { status: job.status });
        }
        if let Some(step) = self.step
            && step < job.step
        {
            return Err(TransitionError::StepRegression {
                from: job.step,
                to: step,
            });
        }
        if let Some(status) = self.status
            && status.rank() < job.status.rank()
        {
            return Err(TransitionError::StatusRegression {
                from: job.status,
                to: status,
            });
        }

        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(step) = self.step {
            job.step = step;
        }
        if let Some(url) = &self.original_url {
            job.original_url = Some(url.clone());
        }
        if let Some(url) = &self.processed_url {
            job.processed_url = Some(url.clone());
        }
        if let Some(id) = &self.original_asset_id {
            job.original_asset_id = Some(id.clone());
        }
        if let Some(id) = &self.processed_asset_id {
            job.processed_asset_id = Some(id.clone());
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
        if let Some(ms) = self.remove_bg_ms {
            job.remove_bg_ms = Some(ms);
        }
        if let Some(ms) = self.flip_ms {
            job.flip_ms = Some(ms);
        }
        if let Some(ms) = self.upload_ms {
            job.upload_ms = Some(ms);
        }
        Ok(())
    }
}
