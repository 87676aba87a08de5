//! Job execution for the image pipeline.
//!
//! # Architecture
//!
//! - `WorkQueue` - Ractor actor admitting tasks FIFO under a concurrency cap
//! - `PipelineExecutor` - Runs one job through removal, flip and upload
//! - `CancellationRegistry` - Per-job cancellation tokens checked between stages
//! - `CacheGate` - Returns an existing ready job for repeated input
//! - `ImageService` - Ties the above together for submit/status/list/delete
//!
//! # Usage
//!
//! ```ignore
//! let (queue, _handle) = WorkQueue::start(2).await?;
//! let executor = PipelineExecutor::new(records.clone(), assets.clone(), remover, settings);
//! let service = ImageService::new(records, assets, executor, queue, UploadLimits::default());
//!
//! let outcome = service.submit(upload).await?;
//! ```

mod cache;
mod cancellation;
mod error;
mod executor;
mod messages;
mod queue_actor;
mod service;

pub use cache::CacheGate;
pub use cancellation::CancellationRegistry;
pub use error::{PipelineError, QueueError, ServiceError};
pub use executor::{ExecutionOutcome, PipelineExecutor, PipelineSettings};
pub use messages::{QueueDepth, QueueMessage, QueuedTask};
pub use queue_actor::{DEFAULT_CONCURRENCY, WorkQueue, WorkQueueActor};
pub use service::{ImageService, SubmitOutcome};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
