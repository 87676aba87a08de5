//! Content cache in front of the pipeline.

use std::sync::Arc;

use db::{DbError, RecordStore};
use image_core::{Fingerprint, ImageJob, ProcessingMode};

/// Answers submissions whose input was already processed in the same mode.
///
/// Only `ready` records count; queued, processing and failed matches are misses.
#[derive(Clone)]
pub struct CacheGate {
    records: Arc<dyn RecordStore>,
}

impl CacheGate {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
        mode: ProcessingMode,
    ) -> Result<Option<ImageJob>, DbError> {
        let hit = self
            .records
            .find_ready_by_fingerprint(fingerprint, mode)
            .await?;
        match &hit {
            Some(job) => tracing::debug!("Cache hit for {} ({}): job {}", fingerprint, mode, job.id),
            None => tracing::debug!("Cache miss for {} ({})", fingerprint, mode),
        }
        Ok(hit)
    }
}
