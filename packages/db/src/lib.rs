//! Job record persistence for the image pipeline.
//!
//! This crate defines the [`RecordStore`] contract the pipeline writes through and
//! two implementations of it:
//!
//! - [`repositories::JobRepository`]: SurrealDB-backed, durable across restarts
//!   when opened on RocksDB
//! - [`MemoryRecordStore`]: process-local, used by tests and ephemeral runs
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod memory;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use memory::MemoryRecordStore;
pub use schema::init_schema;
pub use store::RecordStore;

/// Connect and make sure the schema exists.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<Database, DbError> {
    let db = connect(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
