//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Table holding one row per image job.
pub(crate) const JOB_TABLE: &str = "image_job";

/// Initialize the database schema.
///
/// Safe to run on every start; definitions use `IF NOT EXISTS`.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(IMAGE_JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

const IMAGE_JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS image_job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON image_job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON image_job TYPE string;
DEFINE FIELD IF NOT EXISTS step ON image_job TYPE string;
DEFINE FIELD IF NOT EXISTS mode ON image_job TYPE string;
DEFINE FIELD IF NOT EXISTS fingerprint ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS original_url ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS processed_url ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS original_asset_id ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS processed_asset_id ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS error ON image_job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS remove_bg_ms ON image_job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS flip_ms ON image_job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS upload_ms ON image_job TYPE option<int>;
DEFINE FIELD IF NOT EXISTS created_at ON image_job TYPE string;

-- Cache lookups go by fingerprint + mode among ready jobs
DEFINE INDEX IF NOT EXISTS image_job_cache ON image_job FIELDS fingerprint, mode, status;
DEFINE INDEX IF NOT EXISTS image_job_created ON image_job FIELDS created_at;
"#;
