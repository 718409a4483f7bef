//! Periodic task definition.

use crate::error::JobResult;
use async_trait::async_trait;
use std::time::Duration;

/// Timeout applied to tasks that do not override [`Task::timeout`].
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A unit of recurring work.
///
/// Schedules are six-field cron expressions with a leading seconds field,
/// for example `0 0 2 * * *` for every day at 02:00 UTC.
#[async_trait]
pub trait Task: Send + Sync {
    /// Unique task name. Also names the lock guarding the task.
    fn name(&self) -> &str;

    /// Cron expression.
    fn schedule(&self) -> &str;

    /// Upper bound on a single run. The lock is held for at most this long.
    fn timeout(&self) -> Duration {
        DEFAULT_TASK_TIMEOUT
    }

    /// Performs one run.
    async fn run(&self) -> JobResult<()>;
}
