//! Client for the external background-removal service.
//!
//! [`RemoveBgClient`] talks to remove.bg with bounded retries. The pipeline depends on
//! the [`BackgroundRemover`] trait so tests can substitute their own implementation.

mod client;
mod error;
mod retry;

use bytes::Bytes;
use futures_util::future::BoxFuture;

pub use client::{REMOVE_BG_URL, RemoveBgClient};
pub use error::RemovalError;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper, is_retryable_reqwest_error, retry_with_backoff};

/// One image to cut out.
#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
}

/// Removes the background from an image, returning the cut-out image bytes.
pub trait BackgroundRemover: Send + Sync + 'static {
    fn remove_background(&self, request: RemovalRequest)
    -> BoxFuture<'_, Result<Bytes, RemovalError>>;
}
