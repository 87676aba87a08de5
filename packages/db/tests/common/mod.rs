use db::{DbConfig, DbError, repositories::JobRepository};

/// Fresh in-memory database per test; no state is shared between tests.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    let db = db::init(DbConfig::memory()).await?;
    Ok(JobRepository::new(db))
}
