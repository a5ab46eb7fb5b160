use std::sync::Arc;

use tokio::sync::{Mutex, mpsc::Receiver};

use crate::engine::{
    Engine, metrics::MetricsRegistry, models::ExecutionOutcome, queue::QueuedJob,
};

/// Spawns `workers` tasks that drain the shared job queue. This is the only
/// place submissions run, so `workers` is the concurrency ceiling.
pub fn spawn_worker_pool(
    workers: usize,
    receiver: Arc<Mutex<Receiver<QueuedJob>>>,
    engine: Arc<Engine>,
    metrics: Arc<MetricsRegistry>,
) {
    for worker_id in 0..workers {
        let receiver = receiver.clone();
        let engine = engine.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            worker_loop(worker_id, receiver, engine, metrics).await;
        });
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<Receiver<QueuedJob>>>,
    engine: Arc<Engine>,
    metrics: Arc<MetricsRegistry>,
) {
    loop {
        let job = {
            let mut locked = receiver.lock().await;
            locked.recv().await
        };
        let Some(job) = job else {
            tracing::info!(worker_id, "job queue closed, worker exiting");
            break;
        };

        tracing::info!(
            worker_id,
            submission_id = %job.id,
            language = %job.submission.language,
            "starting submission"
        );
        metrics.started();

        let result = engine.execute(job.id, job.mode, &job.submission).await;
        match &result {
            Ok(ExecutionOutcome::Graded(run)) => metrics.graded(run),
            Ok(ExecutionOutcome::Output(_)) => {}
            Err(err) => metrics.failed(err),
        }
        metrics.completed();

        if job.reply.send(result).is_err() {
            tracing::debug!(worker_id, submission_id = %job.id, "caller went away before the result");
        }
    }
}
