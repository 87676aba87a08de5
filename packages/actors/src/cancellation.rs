//! Per-job cancellation tokens.

use std::collections::HashMap;
use std::sync::Arc;

use image_core::JobId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Maps live job ids to their cancellation token.
///
/// A token is registered when a job is submitted and released once its execution ends
/// or the job is deleted. Executors hold their own clone, so releasing never un-cancels.
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for `job_id`, creating one if needed.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        self.tokens.lock().entry(job_id).or_default().clone()
    }

    /// Signal cancellation. Returns whether the job had a live token.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens.lock().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, job_id: JobId) -> bool {
        self.tokens
            .lock()
            .get(&job_id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Forget the token for `job_id`.
    pub fn release(&self, job_id: JobId) {
        self.tokens.lock().remove(&job_id);
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}
