//! Core domain types for the image job pipeline.
//!
//! This crate contains shared types used across all packages:
//! - ImageJob, JobStatus and JobStep for job records
//! - JobPatch for partial record updates
//! - JobLifecycle, the per-job state machine
//! - Fingerprint for content-addressed cache lookups
//! - ImageUpload and its validation rules

mod fingerprint;
mod job;
pub mod lifecycle;
mod upload;

pub use fingerprint::Fingerprint;
pub use job::{CompletedAssets, ImageJob, JobId, JobPatch, JobStatus, JobStep, ProcessingMode};
pub use lifecycle::{JobLifecycle, Stage, TransitionError};
pub use upload::{DEFAULT_MAX_UPLOAD_BYTES, ImageFormat, ImageUpload, UploadLimits, ValidationError};
