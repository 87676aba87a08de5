//! In-process record store.

use std::collections::HashMap;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use image_core::{Fingerprint, ImageJob, JobId, JobPatch, JobStatus, ProcessingMode};

use crate::{DbError, RecordStore};

/// A [`RecordStore`] kept in a map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    jobs: RwLock<HashMap<JobId, ImageJob>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, job: ImageJob) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        async move {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job.id) {
                return Err(DbError::Duplicate(job.id));
            }
            jobs.insert(job.id, job.clone());
            Ok(job)
        }
        .boxed()
    }

    fn update(&self, id: JobId, patch: JobPatch) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        async move {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(&id).ok_or(DbError::NotFound(id))?;
            // Apply to a copy so a rejected patch leaves the record untouched.
            let mut next = job.clone();
            patch.apply_to(&mut next)?;
            *job = next.clone();
            Ok(next)
        }
        .boxed()
    }

    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        async move { Ok(self.jobs.read().await.get(&id).cloned()) }.boxed()
    }

    fn find_ready_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        mode: ProcessingMode,
    ) -> BoxFuture<'a, Result<Option<ImageJob>, DbError>> {
        async move {
            let jobs = self.jobs.read().await;
            Ok(jobs
                .values()
                .filter(|job| {
                    job.status == JobStatus::Ready
                        && job.mode == mode
                        && job.fingerprint.as_ref() == Some(fingerprint)
                })
                .max_by_key(|job| (job.created_at, job.id))
                .cloned())
        }
        .boxed()
    }

    fn list_ready(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ImageJob>, DbError>> {
        async move {
            let jobs = self.jobs.read().await;
            let mut ready: Vec<ImageJob> = jobs
                .values()
                .filter(|job| job.status == JobStatus::Ready)
                .cloned()
                .collect();
            ready.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            ready.truncate(limit);
            Ok(ready)
        }
        .boxed()
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        async move { Ok(self.jobs.write().await.remove(&id)) }.boxed()
    }
}
