use std::sync::Arc;

use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender, error::TrySendError},
    oneshot,
};
use uuid::Uuid;

use crate::{
    engine::{
        metrics::MetricsRegistry,
        models::{ExecutionMode, ExecutionOutcome, Submission},
    },
    error::{EngineError, EngineResult},
};

#[derive(Debug)]
pub struct QueuedJob {
    pub id: Uuid,
    pub mode: ExecutionMode,
    pub submission: Submission,
    pub reply: oneshot::Sender<EngineResult<ExecutionOutcome>>,
}

#[derive(Clone)]
pub struct Scheduler {
    sender: Sender<QueuedJob>,
    receiver: Arc<Mutex<Receiver<QueuedJob>>>,
    metrics: Arc<MetricsRegistry>,
}

impl Scheduler {
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            metrics,
        }
    }

    /// Queues a submission without waiting for room. The returned receiver
    /// yields the result once a worker has finished with it.
    pub fn enqueue(
        &self,
        mode: ExecutionMode,
        submission: Submission,
    ) -> EngineResult<oneshot::Receiver<EngineResult<ExecutionOutcome>>> {
        let (reply, outcome) = oneshot::channel();
        let job = QueuedJob {
            id: Uuid::new_v4(),
            mode,
            submission,
            reply,
        };
        let id = job.id;

        match self.sender.try_send(job) {
            Ok(()) => {
                self.metrics.submitted();
                tracing::debug!(submission_id = %id, mode = mode.as_str(), "submission queued");
                Ok(outcome)
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.rejected();
                tracing::warn!(submission_id = %id, "job queue full, rejecting submission");
                Err(EngineError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                Err(EngineError::Internal("job queue is closed".to_string()))
            }
        }
    }

    /// Queues a submission and waits for its result.
    pub async fn submit(
        &self,
        mode: ExecutionMode,
        submission: Submission,
    ) -> EngineResult<ExecutionOutcome> {
        let outcome = self.enqueue(mode, submission)?;
        outcome
            .await
            .map_err(|_| EngineError::Internal("worker dropped the submission".to_string()))?
    }

    pub fn receiver(&self) -> Arc<Mutex<Receiver<QueuedJob>>> {
        self.receiver.clone()
    }
}
