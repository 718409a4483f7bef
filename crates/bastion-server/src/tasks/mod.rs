//! Built-in periodic tasks.

mod cleanup;
mod stats;

pub use cleanup::{CleanupTask, TEMP_KEY_PATTERN};
pub use stats::{UserStatsTask, USERS_TOTAL};

use bastion_cache::KeyValueStore;
use bastion_jobs::{Task, TaskScheduler};
use bastion_repository::UserDao;
use std::sync::Arc;
use tracing::error;

/// Registers the built-in tasks. A task that fails to register is logged
/// and skipped; the others still run.
pub fn register_builtin_tasks(scheduler: &TaskScheduler, store: Arc<dyn KeyValueStore>, dao: Arc<dyn UserDao>) {
    let tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(CleanupTask::new(store)),
        Arc::new(UserStatsTask::new(dao)),
    ];

    for task in tasks {
        let name = task.name().to_string();
        if let Err(e) = scheduler.register(task) {
            error!(task = %name, error = %e, "Failed to register task");
        }
    }
}
