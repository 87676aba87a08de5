//! Per-job state machine.
//!
//! Each job flows through: queued → removing_background → flipping → uploading → done,
//! ending `ready` on success or `failed` from any non-terminal position. Every transition
//! returns the [`JobPatch`] that must be persisted before the stage starts.
//!
//! Cancellation is not a state here. The executor checks its cancellation token at each
//! boundary and simply stops writing.

use thiserror::Error;

use crate::job::{CompletedAssets, ImageJob, JobPatch, JobStatus, JobStep};

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RemoveBackground,
    Flip,
    Upload,
}

impl Stage {
    /// The step a record shows while this stage runs.
    pub fn step(self) -> JobStep {
        match self {
            Stage::RemoveBackground => JobStep::RemovingBackground,
            Stage::Flip => JobStep::Flipping,
            Stage::Upload => JobStep::Uploading,
        }
    }

    /// The step a record must be at for this stage to begin.
    fn predecessor(self) -> JobStep {
        match self {
            Stage::RemoveBackground => JobStep::Queued,
            Stage::Flip => JobStep::RemovingBackground,
            Stage::Upload => JobStep::Flipping,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::RemoveBackground => write!(f, "remove_background"),
            Stage::Flip => write!(f, "flip"),
            Stage::Upload => write!(f, "upload"),
        }
    }
}

/// Rejected lifecycle moves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {status} and can no longer change")]
    Terminal { status: JobStatus },

    #[error("cannot begin {stage} while at step {actual} (expected {expected})")]
    OutOfOrder {
        stage: Stage,
        expected: JobStep,
        actual: JobStep,
    },

    #[error("cannot complete job at step {actual} (expected uploading)")]
    NotUploading { actual: JobStep },

    #[error("step cannot move backward from {from} to {to}")]
    StepRegression { from: JobStep, to: JobStep },

    #[error("status cannot move backward from {from} to {to}")]
    StatusRegression { from: JobStatus, to: JobStatus },
}

/// Tracks where a single job is and produces the patch for each legal move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLifecycle {
    status: JobStatus,
    step: JobStep,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self {
            status: JobStatus::Queued,
            step: JobStep::Queued,
        }
    }
}

impl JobLifecycle {
    /// Start tracking from a record's current position.
    pub fn for_job(job: &ImageJob) -> Self {
        Self {
            status: job.status,
            step: job.step,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn step(&self) -> JobStep {
        self.step
    }

    /// Move into `stage`. Stages must begin in order, exactly once each.
    pub fn begin(&mut self, stage: Stage) -> Result<JobPatch, TransitionError> {
        self.ensure_live()?;
        if self.step != stage.predecessor() {
            return Err(TransitionError::OutOfOrder {
                stage,
                expected: stage.predecessor(),
                actual: self.step,
            });
        }

        self.status = JobStatus::Processing;
        self.step = stage.step();
        Ok(JobPatch {
            status: Some(JobStatus::Processing),
            step: Some(self.step),
            ..Default::default()
        })
    }

    /// Finish the upload stage and mark the job ready.
    pub fn complete(&mut self, assets: CompletedAssets) -> Result<JobPatch, TransitionError> {
        self.ensure_live()?;
        if self.step != JobStep::Uploading {
            return Err(TransitionError::NotUploading { actual: self.step });
        }

        self.status = JobStatus::Ready;
        self.step = JobStep::Done;
        Ok(JobPatch {
            status: Some(JobStatus::Ready),
            step: Some(JobStep::Done),
            original_url: Some(assets.original_url),
            processed_url: Some(assets.processed_url),
            original_asset_id: Some(assets.original_asset_id),
            processed_asset_id: Some(assets.processed_asset_id),
            ..Default::default()
        })
    }

    /// Mark the job failed. Legal from any non-terminal position.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<JobPatch, TransitionError> {
        self.ensure_live()?;

        self.status = JobStatus::Failed;
        self.step = JobStep::Done;
        Ok(JobPatch {
            status: Some(JobStatus::Failed),
            step: Some(JobStep::Done),
            error: Some(message.into()),
            ..Default::default()
        })
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                status: self.status,
            });
        }
        Ok(())
    }
}
