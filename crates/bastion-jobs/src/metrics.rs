//! Prometheus metrics for scheduled task runs.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the scheduler.
pub mod names {
    /// Task runs by outcome.
    pub const TASK_RUNS_TOTAL: &str = "bastion_task_runs_total";
    /// Task run duration in seconds.
    pub const TASK_DURATION_SECONDS: &str = "bastion_task_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::TASK_RUNS_TOTAL,
        "Total number of scheduled task runs by outcome"
    );
    describe_histogram!(
        names::TASK_DURATION_SECONDS,
        "Scheduled task run duration in seconds"
    );
}

/// Scheduler metrics recorder.
#[derive(Clone)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record a finished run.
    pub fn run_finished(task: &str, outcome: &'static str, duration: Duration) {
        counter!(
            names::TASK_RUNS_TOTAL,
            "task" => task.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(names::TASK_DURATION_SECONDS, "task" => task.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a run skipped because another instance holds the lock.
    pub fn run_skipped(task: &str) {
        counter!(
            names::TASK_RUNS_TOTAL,
            "task" => task.to_string(),
            "outcome" => "skipped"
        )
        .increment(1);
    }
}
