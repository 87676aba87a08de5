//! Produced boundary of the image job pipeline.
//!
//! This crate exposes what a routing layer needs:
//! - [`ImageApi`] with submit, status, list, delete and health
//! - [`AppConfig`], read from the environment or a lookup function
//! - [`init_image_api`], which wires the record store, asset store, removal client
//!   and work queue together

mod config;
mod images;
mod init;

pub use config::{AppConfig, ConfigError};
pub use images::{
    ApiError, DEFAULT_LIST_LIMIT, DeleteResponse, HealthResponse, ImageApi, MAX_LIST_LIMIT,
    SubmitRequest, SubmitResponse,
};
pub use init::{InitError, init_image_api};

// Re-export core types for convenience
pub use image_core::{ImageJob, JobId, JobStatus, JobStep, ProcessingMode};
