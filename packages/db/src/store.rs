//! The persistence contract the pipeline writes through.

use futures_util::future::BoxFuture;

use image_core::{Fingerprint, ImageJob, JobId, JobPatch, ProcessingMode};

use crate::DbError;

/// Keyed storage of [`ImageJob`] records.
///
/// Implementations must reject patches that regress a record or touch a terminal one
/// ([`JobPatch::apply_to`] does the check) and report unknown ids as [`DbError::NotFound`].
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record.
    fn create(&self, job: ImageJob) -> BoxFuture<'_, Result<ImageJob, DbError>>;

    /// Apply a partial update and return the stored result.
    ///
    /// The check and the write happen as one step: a record that changed or vanished
    /// in between is never overwritten.
    fn update(&self, id: JobId, patch: JobPatch) -> BoxFuture<'_, Result<ImageJob, DbError>>;

    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>>;

    /// Any `ready` record produced from the same input and mode.
    fn find_ready_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        mode: ProcessingMode,
    ) -> BoxFuture<'a, Result<Option<ImageJob>, DbError>>;

    /// Ready records, newest first.
    fn list_ready(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ImageJob>, DbError>>;

    /// Remove a record, returning it as it was at the moment of removal.
    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>>;
}
