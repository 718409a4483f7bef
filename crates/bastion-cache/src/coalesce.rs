//! Request coalescing.
//!
//! Concurrent misses on the same key share one load. The first caller spawns
//! the load as its own task and registers a shared handle to it; later callers
//! clone the handle and wait on it. Because the load runs on its own task,
//! dropping any waiter (the first one included) never aborts it, and a panic
//! inside the load reaches every waiter as an error instead of leaving them
//! blocked.

use bastion_core::{BastionError, BastionResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, trace};

type SharedLoad = Shared<BoxFuture<'static, BastionResult<String>>>;
type InFlight = Arc<Mutex<HashMap<String, SharedLoad>>>;

/// Result of a coalesced call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coalesced {
    /// The loaded raw value or the shared error.
    pub result: BastionResult<String>,
    /// True if this caller joined a load started by another caller.
    pub shared: bool,
}

/// Per-key in-flight load table.
///
/// Each engine owns its own instance, so independent engines (and tests)
/// never coalesce with each other.
#[derive(Default)]
pub struct Coalescer {
    in_flight: InFlight,
}

/// Removes the in-flight entry when the load task finishes, including by panic.
struct InFlightGuard {
    in_flight: InFlight,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
        trace!(key = %self.key, "In-flight load released");
    }
}

impl Coalescer {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a load in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Runs `producer` for `key` unless a load for `key` is already running,
    /// in which case the running load's outcome is returned.
    ///
    /// `producer` is only called by the caller that starts the load.
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> Coalesced
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BastionResult<String>> + Send + 'static,
    {
        let (load, shared) = {
            let mut in_flight = self.in_flight.lock();
            if let Some(load) = in_flight.get(key) {
                (load.clone(), true)
            } else {
                let load = self.spawn_load(key, producer());
                in_flight.insert(key.to_string(), load.clone());
                (load, false)
            }
        };

        Coalesced {
            result: load.await,
            shared,
        }
    }

    fn spawn_load<Fut>(&self, key: &str, fut: Fut) -> SharedLoad
    where
        Fut: Future<Output = BastionResult<String>> + Send + 'static,
    {
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };

        // The guard lives inside the task, so the entry is removed when the
        // load ends however it ends. The task's first lock attempt waits
        // until `run` has inserted the entry and released the table.
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await
        });

        let key = key.to_string();
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(key = %key, error = %join_error, "Cache load task failed");
                    Err(BastionError::Internal(format!("cache load for '{key}' failed: {join_error}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}
