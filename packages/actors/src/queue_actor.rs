//! Bounded FIFO work queue.
//!
//! The actor owns the pending list and the active counter, so every admission decision
//! is serialized through its mailbox. At most `concurrency` tasks run at once; the rest
//! wait in submission order.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures_util::FutureExt;
use image_core::JobId;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;

use crate::error::QueueError;
use crate::messages::{QueueDepth, QueueMessage, QueuedTask};

/// Default number of concurrent tasks.
pub const DEFAULT_CONCURRENCY: usize = 2;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the work queue actor.
pub struct WorkQueueState {
    concurrency: usize,
    pending: VecDeque<QueuedTask>,
    active: usize,
}

impl WorkQueueState {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            pending: VecDeque::new(),
            active: 0,
        }
    }

    fn depth(&self) -> QueueDepth {
        QueueDepth {
            pending: self.pending.len(),
            active: self.active,
        }
    }

    /// Start pending tasks while slots are free.
    fn admit(&mut self, myself: &ActorRef<QueueMessage>) {
        while self.active < self.concurrency {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.active += 1;
            spawn_task(myself.clone(), task);
        }
    }
}

/// Run a task and report back when it ends. The inner spawn isolates panics.
fn spawn_task(queue: ActorRef<QueueMessage>, task: QueuedTask) {
    let QueuedTask { job_id, run } = task;
    tokio::spawn(async move {
        let panicked = match tokio::spawn(run).await {
            Ok(()) => false,
            Err(e) => {
                tracing::error!("Task for job {:?} panicked: {}", job_id, e);
                true
            }
        };
        // The queue may already be shut down.
        let _ = queue.send_message(QueueMessage::TaskFinished { job_id, panicked });
    });
}

/// Work queue actor.
pub struct WorkQueueActor;

impl Actor for WorkQueueActor {
    type Msg = QueueMessage;
    type State = WorkQueueState;
    type Arguments = WorkQueueState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting work queue with concurrency {}", args.concurrency);
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { task } => {
                tracing::debug!("Enqueued task for job {:?}", task.job_id);
                state.pending.push_back(task);
                state.admit(&myself);
            }

            QueueMessage::TaskFinished { job_id, panicked } => {
                state.active = state.active.saturating_sub(1);
                if !panicked {
                    tracing::debug!("Task for job {:?} finished", job_id);
                }
                state.admit(&myself);
            }

            QueueMessage::Depth { reply } => {
                let _ = reply.send(state.depth());
            }

            QueueMessage::CancelPending { job_id, reply } => {
                let before = state.pending.len();
                state.pending.retain(|task| task.job_id != Some(job_id));
                let removed = state.pending.len() != before;
                if removed {
                    tracing::info!("Removed pending task for job {}", job_id);
                }
                let _ = reply.send(removed);
            }

            QueueMessage::Shutdown => {
                tracing::info!(
                    "Shutting down work queue ({} pending dropped)",
                    state.pending.len()
                );
                state.pending.clear();
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Handle to a running work queue.
#[derive(Clone)]
pub struct WorkQueue {
    actor: ActorRef<QueueMessage>,
    concurrency: usize,
}

impl WorkQueue {
    /// Spawn the queue actor.
    pub async fn start(concurrency: usize) -> Result<(Self, JoinHandle<()>), QueueError> {
        let state = WorkQueueState::new(concurrency);
        let concurrency = state.concurrency;
        let (actor, handle) = Actor::spawn(None, WorkQueueActor, state)
            .await
            .map_err(|e| QueueError::Spawn(e.to_string()))?;

        Ok((Self { actor, concurrency }, handle))
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Append `task` to the queue. It starts once every earlier task has been admitted
    /// and a slot is free.
    pub fn enqueue<F>(&self, job_id: Option<JobId>, task: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = QueuedTask {
            job_id,
            run: task.boxed(),
        };
        self.actor
            .send_message(QueueMessage::Enqueue { task })
            .map_err(|_| QueueError::Stopped)
    }

    /// Pending plus active tasks. Only meant as a backpressure signal.
    pub async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let result = ractor::rpc::call(
            &self.actor,
            |reply| QueueMessage::Depth { reply },
            Some(CALL_TIMEOUT),
        )
        .await;
        unwrap_call(result)
    }

    /// Withdraw the not-yet-started task for `job_id`. Returns whether one was removed.
    pub async fn cancel_pending(&self, job_id: JobId) -> Result<bool, QueueError> {
        let result = ractor::rpc::call(
            &self.actor,
            |reply| QueueMessage::CancelPending { job_id, reply },
            Some(CALL_TIMEOUT),
        )
        .await;
        unwrap_call(result)
    }

    /// Stop the actor. Running tasks finish on their own; pending ones are dropped.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }
}

fn unwrap_call<T, E>(result: Result<CallResult<T>, E>) -> Result<T, QueueError> {
    match result {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(QueueError::Timeout),
        Ok(CallResult::SenderError) | Err(_) => Err(QueueError::Stopped),
    }
}
