//! Nightly removal of temporary keys that were written without an expiry.

use async_trait::async_trait;
use bastion_cache::{KeyTtl, KeyValueStore};
use bastion_jobs::{cron_expressions, JobResult, Task};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Keys under this pattern are expected to expire on their own.
pub const TEMP_KEY_PATTERN: &str = "temp:*";

const DELETE_BATCH: usize = 100;

/// Deletes `temp:*` keys that have no TTL.
pub struct CleanupTask {
    store: Arc<dyn KeyValueStore>,
}

impl CleanupTask {
    /// Creates the task over the shared store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn schedule(&self) -> &str {
        cron_expressions::DAILY_2AM
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }

    async fn run(&self) -> JobResult<()> {
        info!("Starting cleanup of temporary keys");

        let keys = self.store.scan(TEMP_KEY_PATTERN).await?;
        let scanned = keys.len();

        let mut stale = Vec::new();
        for key in keys {
            match self.store.ttl(&key).await {
                Ok(KeyTtl::Persistent) => stale.push(key),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to read key TTL"),
            }
        }

        let mut removed = 0;
        for batch in stale.chunks(DELETE_BATCH) {
            match self.store.delete(batch).await {
                Ok(n) => removed += n,
                Err(e) => warn!(keys = batch.len(), error = %e, "Failed to delete temporary keys"),
            }
        }

        info!(scanned, removed, "Cleanup completed");
        Ok(())
    }
}
