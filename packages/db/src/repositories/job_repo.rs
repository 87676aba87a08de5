//! SurrealDB-backed job repository.

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use image_core::{
    Fingerprint, ImageJob, JobId, JobPatch, JobStatus, JobStep, ProcessingMode,
};

use crate::schema::JOB_TABLE;
use crate::{Database, DbError, RecordStore};

/// Repository for image job persistence.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Row shape stored in the `image_job` table.
///
/// Absent optionals are skipped rather than written as null so they land as NONE,
/// which is what `option<...>` fields accept.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    #[serde(default, skip_serializing)]
    id: Option<RecordId>,
    job_id: String,
    status: JobStatus,
    step: JobStep,
    mode: ProcessingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remove_bg_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flip_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    upload_ms: Option<i64>,
    /// Fixed-width RFC 3339 so string order matches time order.
    created_at: String,
}

impl From<&ImageJob> for JobRecord {
    fn from(job: &ImageJob) -> Self {
        Self {
            id: None,
            job_id: job.id.to_string(),
            status: job.status,
            step: job.step,
            mode: job.mode,
            fingerprint: job.fingerprint.clone(),
            original_url: job.original_url.clone(),
            processed_url: job.processed_url.clone(),
            original_asset_id: job.original_asset_id.clone(),
            processed_asset_id: job.processed_asset_id.clone(),
            error: job.error.clone(),
            remove_bg_ms: job.remove_bg_ms.map(to_i64),
            flip_ms: job.flip_ms.map(to_i64),
            upload_ms: job.upload_ms.map(to_i64),
            created_at: job.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

impl TryFrom<JobRecord> for ImageJob {
    type Error = DbError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let id = JobId::parse(&record.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {e}", record.job_id)))?;
        let created_at = DateTime::parse_from_rfc3339(&record.created_at)
            .map_err(|e| DbError::Serialization(format!("bad created_at for {id}: {e}")))?
            .with_timezone(&Utc);

        Ok(ImageJob {
            id,
            status: record.status,
            step: record.step,
            original_url: record.original_url,
            processed_url: record.processed_url,
            original_asset_id: record.original_asset_id,
            processed_asset_id: record.processed_asset_id,
            fingerprint: record.fingerprint,
            mode: record.mode,
            error: record.error,
            remove_bg_ms: record.remove_bg_ms.map(to_u64),
            flip_ms: record.flip_ms.map(to_u64),
            upload_ms: record.upload_ms.map(to_u64),
            created_at,
        })
    }
}

fn to_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn to_u64(ms: i64) -> u64 {
    u64::try_from(ms).unwrap_or(0)
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &ImageJob) -> Result<ImageJob, DbError> {
        let existing: Option<JobRecord> = self.db.select((JOB_TABLE, job.id.to_string())).await?;
        if existing.is_some() {
            return Err(DbError::Duplicate(job.id));
        }

        let record: Option<JobRecord> = self
            .db
            .create((JOB_TABLE, job.id.to_string()))
            .content(JobRecord::from(job))
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to create job {}", job.id)))?
            .try_into()
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Option<ImageJob>, DbError> {
        let record: Option<JobRecord> = self.db.select((JOB_TABLE, id.to_string())).await?;
        record.map(ImageJob::try_from).transpose()
    }

    /// Apply a patch, checking it against the stored record first.
    ///
    /// The write only lands if the row is still at the status and step the patch was
    /// checked against, so it is a single compare-and-set.
    pub async fn update(&self, id: JobId, patch: &JobPatch) -> Result<ImageJob, DbError> {
        let current = self.get(id).await?.ok_or(DbError::NotFound(id))?;
        let mut job = current.clone();
        patch.apply_to(&mut job)?;

        let mut result = self
            .db
            .query(
                r#"
                UPDATE type::thing($table, $id) CONTENT $row
                WHERE status = $status AND step = $step
                RETURN AFTER
                "#,
            )
            .bind(("table", JOB_TABLE))
            .bind(("id", id.to_string()))
            .bind(("row", JobRecord::from(&job)))
            .bind(("status", current.status))
            .bind(("step", current.step))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        match records.into_iter().next() {
            Some(record) => record.try_into(),
            None if self.get(id).await?.is_none() => Err(DbError::NotFound(id)),
            None => Err(DbError::Conflict(id)),
        }
    }

    /// Most recent ready job for a fingerprint and mode.
    pub async fn find_ready_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        mode: ProcessingMode,
    ) -> Result<Option<ImageJob>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                SELECT * FROM image_job
                WHERE fingerprint = $fingerprint AND mode = $mode AND status = "ready"
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(("fingerprint", fingerprint.as_str().to_string()))
            .bind(("mode", mode.as_str()))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        records.into_iter().next().map(ImageJob::try_from).transpose()
    }

    /// Ready jobs ordered newest first.
    pub async fn list_ready(&self, limit: usize) -> Result<Vec<ImageJob>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                SELECT * FROM image_job
                WHERE status = "ready"
                ORDER BY created_at DESC, job_id DESC
                LIMIT $limit
                "#,
            )
            .bind(("limit", limit as i64))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        records.into_iter().map(ImageJob::try_from).collect()
    }

    /// Delete a job, returning the row as it was when removed.
    pub async fn delete(&self, id: JobId) -> Result<Option<ImageJob>, DbError> {
        let removed: Option<JobRecord> = self.db.delete((JOB_TABLE, id.to_string())).await?;
        removed.map(ImageJob::try_from).transpose()
    }

    /// Count all jobs.
    pub async fn count(&self) -> Result<usize, DbError> {
        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let mut result = self
            .db
            .query("SELECT count() AS count FROM image_job GROUP ALL")
            .await?;

        let counts: Vec<CountResult> = result.take(0)?;
        Ok(counts.first().map(|c| c.count as usize).unwrap_or(0))
    }
}

impl RecordStore for JobRepository {
    fn create(&self, job: ImageJob) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        async move { JobRepository::create(self, &job).await }.boxed()
    }

    fn update(&self, id: JobId, patch: JobPatch) -> BoxFuture<'_, Result<ImageJob, DbError>> {
        async move { JobRepository::update(self, id, &patch).await }.boxed()
    }

    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        async move { JobRepository::get(self, id).await }.boxed()
    }

    fn find_ready_by_fingerprint<'a>(
        &'a self,
        fingerprint: &'a Fingerprint,
        mode: ProcessingMode,
    ) -> BoxFuture<'a, Result<Option<ImageJob>, DbError>> {
        async move { JobRepository::find_ready_by_fingerprint(self, fingerprint, mode).await }
            .boxed()
    }

    fn list_ready(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ImageJob>, DbError>> {
        async move { JobRepository::list_ready(self, limit).await }.boxed()
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<Option<ImageJob>, DbError>> {
        async move { JobRepository::delete(self, id).await }.boxed()
    }
}
