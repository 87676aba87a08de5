//! Message types for actor communication.

use futures_util::future::BoxFuture;
use image_core::JobId;
use ractor::RpcReplyPort;

/// A unit of work waiting for a slot.
pub struct QueuedTask {
    /// Job this task belongs to, so it can be withdrawn before it starts.
    pub job_id: Option<JobId>,
    pub run: BoxFuture<'static, ()>,
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

/// Pending and executing task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub pending: usize,
    pub active: usize,
}

impl QueueDepth {
    /// Pending plus active.
    pub fn total(&self) -> usize {
        self.pending + self.active
    }
}

/// Messages for the WorkQueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append a task to the tail of the queue.
    Enqueue { task: QueuedTask },

    /// A running task ended, successfully or not.
    TaskFinished {
        job_id: Option<JobId>,
        panicked: bool,
    },

    /// Report current depth.
    Depth { reply: RpcReplyPort<QueueDepth> },

    /// Withdraw a task that has not started yet. Replies whether one was removed.
    CancelPending {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// Stop the actor; pending tasks are dropped.
    Shutdown,
}
