#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use image_core::{
    CompletedAssets, Fingerprint, ImageJob, JobId, JobLifecycle, JobPatch, JobStatus, JobStep,
    ProcessingMode, Stage, TransitionError,
};

use db::{DbError, RecordStore, repositories::JobRepository};

fn queued(bytes: &[u8], mode: ProcessingMode) -> ImageJob {
    ImageJob::queued(Fingerprint::compute(bytes, mode), mode)
}

fn assets(id: JobId) -> CompletedAssets {
    CompletedAssets {
        original_url: format!("memory:///image-pipeline/{id}-original.png"),
        original_asset_id: format!("image-pipeline/{id}-original.png"),
        processed_url: format!("memory:///image-pipeline/{id}-processed.png"),
        processed_asset_id: format!("image-pipeline/{id}-processed.png"),
    }
}

async fn drive_to_ready(repo: &JobRepository, job: &ImageJob) -> Result<ImageJob, DbError> {
    let mut lifecycle = JobLifecycle::for_job(job);
    for stage in [Stage::RemoveBackground, Stage::Flip, Stage::Upload] {
        repo.update(job.id, &lifecycle.begin(stage)?).await?;
    }
    let patch = lifecycle.complete(assets(job.id))?.with_upload_ms(12);
    repo.update(job.id, &patch).await
}

#[tokio::test]
async fn test_create_get_delete() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let job = queued(b"first", ProcessingMode::Optimized);
    let created = repo.create(&job).await?;
    assert_eq!(created.id, job.id);
    assert_eq!(created.status, JobStatus::Queued);
    assert_eq!(created.step, JobStep::Queued);
    assert_eq!(created.fingerprint, job.fingerprint);
    assert_eq!(created.original_url, None);

    let loaded = repo.get(job.id).await?.expect("job should exist");
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.mode, ProcessingMode::Optimized);
    assert_eq!(
        loaded.created_at.timestamp_micros(),
        job.created_at.timestamp_micros()
    );

    let duplicate = repo.create(&job).await;
    assert!(matches!(duplicate, Err(DbError::Duplicate(id)) if id == job.id));

    assert_eq!(repo.count().await?, 1);
    let removed = repo.delete(job.id).await?.expect("row should be returned");
    assert_eq!(removed.id, job.id);
    assert!(repo.delete(job.id).await?.is_none());
    assert!(repo.get(job.id).await?.is_none());
    assert_eq!(repo.count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_lifecycle_updates_persist() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = repo
        .create(&queued(b"walk", ProcessingMode::Original))
        .await?;

    let mut lifecycle = JobLifecycle::for_job(&job);
    let removing = repo
        .update(job.id, &lifecycle.begin(Stage::RemoveBackground)?)
        .await?;
    assert_eq!(removing.status, JobStatus::Processing);
    assert_eq!(removing.step, JobStep::RemovingBackground);

    let flipping = repo
        .update(
            job.id,
            &lifecycle.begin(Stage::Flip)?.with_remove_bg_ms(830),
        )
        .await?;
    assert_eq!(flipping.step, JobStep::Flipping);
    assert_eq!(flipping.remove_bg_ms, Some(830));

    let failed = repo
        .update(job.id, &lifecycle.fail("upload failed: bucket missing")?)
        .await?;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.step, JobStep::Done);
    assert_eq!(failed.error.as_deref(), Some("upload failed: bucket missing"));
    assert_eq!(failed.remove_bg_ms, Some(830));
    assert!(failed.is_consistent());

    Ok(())
}

#[tokio::test]
async fn test_terminal_and_regressing_updates_are_rejected() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = repo
        .create(&queued(b"ready", ProcessingMode::Optimized))
        .await?;
    let ready = drive_to_ready(&repo, &job).await?;
    assert_eq!(ready.status, JobStatus::Ready);
    assert!(ready.is_consistent());

    let late = repo
        .update(
            job.id,
            &JobPatch {
                error: Some("late failure".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        late,
        Err(DbError::InvalidTransition(TransitionError::Terminal { .. }))
    ));

    let other = repo
        .create(&queued(b"other", ProcessingMode::Optimized))
        .await?;
    let mut lifecycle = JobLifecycle::for_job(&other);
    repo.update(other.id, &lifecycle.begin(Stage::RemoveBackground)?)
        .await?;
    let backwards = repo
        .update(
            other.id,
            &JobPatch {
                step: Some(JobStep::Queued),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        backwards,
        Err(DbError::InvalidTransition(TransitionError::StepRegression { .. }))
    ));

    let missing = repo.update(JobId::new(), &JobPatch::default()).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_cache_lookup_and_listing() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let pending = repo
        .create(&queued(b"same image", ProcessingMode::Optimized))
        .await?;
    let fingerprint = pending.fingerprint.clone().expect("fingerprint set");

    assert!(
        repo.find_ready_by_fingerprint(&fingerprint, ProcessingMode::Optimized)
            .await?
            .is_none(),
        "queued jobs are not cache hits"
    );

    drive_to_ready(&repo, &pending).await?;
    let hit = repo
        .find_ready_by_fingerprint(&fingerprint, ProcessingMode::Optimized)
        .await?;
    assert_eq!(hit.map(|job| job.id), Some(pending.id));
    assert!(
        repo.find_ready_by_fingerprint(&fingerprint, ProcessingMode::Original)
            .await?
            .is_none()
    );

    let mut ready_ids = vec![pending.id];
    for i in 1..=3i64 {
        let mut job = queued(format!("image-{i}").as_bytes(), ProcessingMode::Optimized);
        job.created_at = pending.created_at + chrono::Duration::seconds(i);
        let job = repo.create(&job).await?;
        drive_to_ready(&repo, &job).await?;
        ready_ids.push(job.id);
    }
    repo.create(&queued(b"not ready", ProcessingMode::Optimized))
        .await?;

    let listed: Vec<JobId> = repo.list_ready(3).await?.into_iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![ready_ids[3], ready_ids[2], ready_ids[1]]);

    Ok(())
}

#[tokio::test]
async fn test_usable_through_record_store_trait() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let store: &dyn RecordStore = &repo;

    let job = store
        .create(queued(b"dyn", ProcessingMode::Optimized))
        .await?;
    let mut lifecycle = JobLifecycle::for_job(&job);
    let updated = store
        .update(job.id, lifecycle.begin(Stage::RemoveBackground)?)
        .await?;
    assert_eq!(updated.step, JobStep::RemovingBackground);
    assert_eq!(store.delete(job.id).await?, Some(updated));
    assert!(store.get(job.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_delete_returns_ready_snapshot() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = repo
        .create(&queued(b"snapshot", ProcessingMode::Original))
        .await?;
    let ready = drive_to_ready(&repo, &job).await?;

    let removed = repo.delete(job.id).await?.expect("row should be returned");
    assert_eq!(removed.asset_ids(), ready.asset_ids());
    assert_eq!(removed.asset_ids().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_update_after_delete_is_not_found() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = repo
        .create(&queued(b"gone", ProcessingMode::Optimized))
        .await?;
    let mut lifecycle = JobLifecycle::for_job(&job);
    repo.delete(job.id).await?;

    let err = repo
        .update(job.id, &lifecycle.begin(Stage::RemoveBackground)?)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(id) if id == job.id));
    assert!(repo.get(job.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_terminal_writes_have_one_winner() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = repo
        .create(&queued(b"race", ProcessingMode::Optimized))
        .await?;
    let first = JobLifecycle::for_job(&job).fail("first")?;
    let second = JobLifecycle::for_job(&job).fail("second")?;

    let (a, b) = tokio::join!(repo.update(job.id, &first), repo.update(job.id, &second));
    let winners: Vec<ImageJob> = [a, b].into_iter().filter_map(Result::ok).collect();
    assert_eq!(winners.len(), 1);

    let stored = repo.get(job.id).await?.expect("job should exist");
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error, winners[0].error);

    Ok(())
}
