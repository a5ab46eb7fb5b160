use std::sync::atomic::{AtomicU64, Ordering};

use crate::{engine::verdict::RunResult, error::EngineError};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    submitted_total: AtomicU64,
    started_total: AtomicU64,
    completed_total: AtomicU64,
    rejected_total: AtomicU64,
    compile_errors_total: AtomicU64,
    runtime_errors_total: AtomicU64,
    timed_out_total: AtomicU64,
    internal_errors_total: AtomicU64,
    cases_passed_total: AtomicU64,
    cases_failed_total: AtomicU64,
    queue_depth: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) {
        self.started_total.fetch_add(1, Ordering::Relaxed);
        self.decrement_queue_depth();
    }

    pub fn completed(&self) {
        self.completed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn graded(&self, result: &RunResult) {
        self.cases_passed_total
            .fetch_add(result.passed as u64, Ordering::Relaxed);
        self.cases_failed_total
            .fetch_add(result.failed as u64, Ordering::Relaxed);
    }

    pub fn failed(&self, err: &EngineError) {
        let counter = match err {
            EngineError::Compile(_) => &self.compile_errors_total,
            EngineError::Runtime(_) => &self.runtime_errors_total,
            EngineError::Timeout { .. } => &self.timed_out_total,
            _ => &self.internal_errors_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE judge_submissions_total counter\n",
                "judge_submissions_total {}\n",
                "# TYPE judge_runs_started_total counter\n",
                "judge_runs_started_total {}\n",
                "# TYPE judge_runs_completed_total counter\n",
                "judge_runs_completed_total {}\n",
                "# TYPE judge_rejected_total counter\n",
                "judge_rejected_total {}\n",
                "# TYPE judge_compile_errors_total counter\n",
                "judge_compile_errors_total {}\n",
                "# TYPE judge_runtime_errors_total counter\n",
                "judge_runtime_errors_total {}\n",
                "# TYPE judge_timeouts_total counter\n",
                "judge_timeouts_total {}\n",
                "# TYPE judge_internal_errors_total counter\n",
                "judge_internal_errors_total {}\n",
                "# TYPE judge_cases_passed_total counter\n",
                "judge_cases_passed_total {}\n",
                "# TYPE judge_cases_failed_total counter\n",
                "judge_cases_failed_total {}\n",
                "# TYPE judge_queue_depth gauge\n",
                "judge_queue_depth {}\n"
            ),
            self.submitted_total.load(Ordering::Relaxed),
            self.started_total.load(Ordering::Relaxed),
            self.completed_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.compile_errors_total.load(Ordering::Relaxed),
            self.runtime_errors_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.internal_errors_total.load(Ordering::Relaxed),
            self.cases_passed_total.load(Ordering::Relaxed),
            self.cases_failed_total.load(Ordering::Relaxed),
            self.queue_depth.load(Ordering::Relaxed),
        )
    }

    fn decrement_queue_depth(&self) {
        let mut current = self.queue_depth.load(Ordering::Relaxed);
        while current > 0 {
            match self.queue_depth.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
