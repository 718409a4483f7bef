//! Cron scheduler for periodic tasks.
//!
//! Every instance of the service runs the same schedule. When a run comes
//! due, the instance first takes the task's lock in the shared store; the
//! instances that lose the race skip that run.

use crate::error::{JobError, JobResult};
use crate::metrics::SchedulerMetrics;
use crate::task::Task;
use bastion_cache::{KeyValueStore, TaskLock};
use bastion_config::SchedulerConfig;
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How a single run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The task returned `Ok`.
    Success,
    /// The task returned an error.
    Failure,
    /// The task exceeded its timeout and was cancelled.
    Timeout,
    /// Another instance held the lock, or the lock could not be taken.
    Skipped,
}

impl RunOutcome {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Registered {
    task: Arc<dyn Task>,
    schedule: Schedule,
    timeout: Duration,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    last_outcome: Option<RunOutcome>,
}

impl Registered {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            name: self.task.name().to_string(),
            schedule: self.task.schedule().to_string(),
            timeout: self.timeout,
            next_run: self.next_run,
            last_run: self.last_run,
            last_outcome: self.last_outcome,
        }
    }
}

/// Information about a registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task name.
    pub name: String,

    /// Cron expression.
    pub schedule: String,

    /// Effective run timeout.
    pub timeout: Duration,

    /// Next scheduled run time.
    pub next_run: Option<DateTime<Utc>>,

    /// Start time of the last run on this instance.
    pub last_run: Option<DateTime<Utc>>,

    /// Outcome of the last run on this instance.
    pub last_outcome: Option<RunOutcome>,
}

/// Cron scheduler whose runs are serialized across instances by [`TaskLock`].
pub struct TaskScheduler {
    /// Per-task lock namespace.
    lock: TaskLock,

    /// Scheduler configuration.
    config: SchedulerConfig,

    /// Registered tasks by name.
    tasks: Arc<RwLock<HashMap<String, Registered>>>,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: Arc<AtomicBool>,
}

impl TaskScheduler {
    /// Create a scheduler that coordinates through `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            lock: TaskLock::new(store, config.lock_prefix.clone()),
            config,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a task.
    ///
    /// Fails if the name is taken or the cron expression does not parse.
    /// A zero task timeout falls back to the configured default.
    pub fn register(&self, task: Arc<dyn Task>) -> JobResult<()> {
        let name = task.name().to_string();
        let schedule = Schedule::from_str(task.schedule()).map_err(|e| {
            JobError::Configuration(format!(
                "Invalid cron expression '{}' for task {name}: {e}",
                task.schedule()
            ))
        })?;

        let timeout = match task.timeout() {
            t if t.is_zero() => self.config.default_task_timeout(),
            t => t,
        };
        let next_run = schedule.after(&Utc::now()).next();

        let mut tasks = self.tasks.write();
        if tasks.contains_key(&name) {
            return Err(JobError::DuplicateTask(name));
        }

        info!(
            task = %name,
            schedule = %task.schedule(),
            timeout_secs = timeout.as_secs(),
            next_run = ?next_run,
            "Registered task"
        );
        tasks.insert(
            name,
            Registered {
                task,
                schedule,
                timeout,
                next_run,
                last_run: None,
                last_outcome: None,
            },
        );
        Ok(())
    }

    /// Check if the scheduler loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the scheduler.
    ///
    /// Runs until [`Self::stop`] is called, then waits for in-flight runs
    /// before returning. Returns immediately when disabled by configuration.
    pub async fn start(&self) -> JobResult<()> {
        if !self.config.enabled {
            info!("Scheduler disabled by configuration");
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Scheduler("Scheduler already running".to_string()));
        }

        info!(
            tasks = self.tasks.read().len(),
            tick_interval_ms = self.config.tick_interval_ms,
            "Starting scheduler"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut tick = interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs: JoinSet<RunOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }

                _ = tick.tick() => {
                    for run in self.take_due(Utc::now()) {
                        runs.spawn(run);
                    }
                }

                Some(joined) = runs.join_next(), if !runs.is_empty() => log_join(joined),
            }
        }

        if !runs.is_empty() {
            info!(in_flight = runs.len(), "Waiting for running tasks");
        }
        while let Some(joined) = runs.join_next().await {
            log_join(joined);
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");

        Ok(())
    }

    /// Stop the scheduler.
    pub fn stop(&self) {
        info!("Stopping scheduler...");
        let _ = self.shutdown_tx.send(());
    }

    /// Run a task now, outside its schedule. The lock still applies.
    pub async fn run_now(&self, name: &str) -> JobResult<RunOutcome> {
        let run = {
            let tasks = self.tasks.read();
            let entry = tasks
                .get(name)
                .ok_or_else(|| JobError::NotFound(name.to_string()))?;
            self.run_future(Arc::clone(&entry.task), entry.timeout)
        };
        Ok(run.await)
    }

    /// List registered tasks, ordered by name.
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self.tasks.read().values().map(Registered::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Look up one task.
    pub fn get_task(&self, name: &str) -> Option<TaskInfo> {
        self.tasks.read().get(name).map(Registered::info)
    }

    /// Advances every task due at `now` to its next slot and returns the
    /// runs to start.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<BoxFuture<'static, RunOutcome>> {
        let mut tasks = self.tasks.write();
        let mut due = Vec::new();

        for entry in tasks.values_mut() {
            match entry.next_run {
                Some(at) if at <= now => {}
                _ => continue,
            }
            entry.next_run = entry.schedule.after(&now).next();
            debug!(task = %entry.task.name(), next_run = ?entry.next_run, "Task due");
            due.push(self.run_future(Arc::clone(&entry.task), entry.timeout));
        }

        due
    }

    fn run_future(&self, task: Arc<dyn Task>, timeout: Duration) -> BoxFuture<'static, RunOutcome> {
        let lock = self.lock.clone();
        let tasks = Arc::clone(&self.tasks);

        async move {
            let started_at = Utc::now();
            let outcome = execute(&lock, task.as_ref(), timeout).await;
            if let Some(entry) = tasks.write().get_mut(task.name()) {
                entry.last_run = Some(started_at);
                entry.last_outcome = Some(outcome);
            }
            outcome
        }
        .boxed()
    }
}

/// One guarded run: take the lock, run under the timeout, release.
async fn execute(lock: &TaskLock, task: &dyn Task, timeout: Duration) -> RunOutcome {
    let name = task.name();

    let guard = match lock.try_acquire(name, timeout).await {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            debug!(task = %name, "Task running elsewhere, skipping");
            SchedulerMetrics::run_skipped(name);
            return RunOutcome::Skipped;
        }
        Err(e) => {
            warn!(task = %name, error = %e, "Failed to acquire task lock, skipping");
            SchedulerMetrics::run_skipped(name);
            return RunOutcome::Skipped;
        }
    };

    debug!(task = %name, "Task started");
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, task.run()).await {
        Ok(Ok(())) => RunOutcome::Success,
        Ok(Err(e)) => {
            error!(task = %name, error = %e, "Task failed");
            RunOutcome::Failure
        }
        Err(_) => {
            error!(task = %name, timeout_secs = timeout.as_secs(), "Task timed out");
            RunOutcome::Timeout
        }
    };
    let elapsed = started.elapsed();

    guard.release().await;

    SchedulerMetrics::run_finished(name, outcome.as_str(), elapsed);
    info!(
        task = %name,
        outcome = %outcome,
        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "Task finished"
    );
    outcome
}

fn log_join(joined: Result<RunOutcome, JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Task panicked");
        }
    }
}

/// Common cron expressions (seconds field first).
pub mod cron_expressions {
    /// Every second.
    pub const EVERY_SECOND: &str = "* * * * * *";

    /// Every minute.
    pub const EVERY_MINUTE: &str = "0 * * * * *";

    /// Every hour, on the hour.
    pub const EVERY_HOUR: &str = "0 0 * * * *";

    /// Every day at 02:00.
    pub const DAILY_2AM: &str = "0 0 2 * * *";
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bastion_cache::{KeyTtl, MemoryStore, RedisStore};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Sleep(Duration),
    }

    struct RecordingTask {
        name: &'static str,
        schedule: &'static str,
        timeout: Duration,
        behaviour: Behaviour,
        runs: Arc<AtomicUsize>,
        store: Arc<MemoryStore>,
        lock_ttl_seen: Mutex<Option<KeyTtl>>,
    }

    impl RecordingTask {
        fn new(name: &'static str, store: &Arc<MemoryStore>, behaviour: Behaviour) -> Self {
            Self {
                name,
                schedule: cron_expressions::EVERY_MINUTE,
                timeout: Duration::from_secs(30),
                behaviour,
                runs: Arc::new(AtomicUsize::new(0)),
                store: Arc::clone(store),
                lock_ttl_seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Task for RecordingTask {
        fn name(&self) -> &str {
            self.name
        }

        fn schedule(&self) -> &str {
            self.schedule
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn run(&self) -> JobResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let ttl = self.store.ttl(&format!("task:lock:{}", self.name)).await.unwrap();
            *self.lock_ttl_seen.lock().unwrap() = Some(ttl);

            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(JobError::ExecutionFailed("boom".into())),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            }
        }
    }

    fn scheduler(store: &Arc<MemoryStore>) -> TaskScheduler {
        let store: Arc<dyn KeyValueStore> = store.clone();
        TaskScheduler::new(store, SchedulerConfig::default())
    }

    #[test]
    fn test_cron_expression_parsing() {
        for expr in [
            cron_expressions::EVERY_SECOND,
            cron_expressions::EVERY_MINUTE,
            cron_expressions::EVERY_HOUR,
            cron_expressions::DAILY_2AM,
        ] {
            let schedule = Schedule::from_str(expr).unwrap();
            assert!(schedule.after(&Utc::now()).next().is_some(), "{expr}");
        }
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);

        assert_ok!(scheduler.register(Arc::new(RecordingTask::new("cleanup", &store, Behaviour::Succeed))));
        let err = assert_err!(scheduler.register(Arc::new(RecordingTask::new("cleanup", &store, Behaviour::Succeed))));

        assert!(matches!(err, JobError::DuplicateTask(name) if name == "cleanup"));
        assert_eq!(scheduler.list_tasks().len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_cron() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        let mut recorder = RecordingTask::new("broken", &store, Behaviour::Succeed);
        recorder.schedule = "every tuesday";

        let err = assert_err!(scheduler.register(Arc::new(recorder)));
        assert!(matches!(err, JobError::Configuration(_)));
        assert!(scheduler.get_task("broken").is_none());
    }

    #[test]
    fn test_zero_timeout_uses_configured_default() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        let mut recorder = RecordingTask::new("stats", &store, Behaviour::Succeed);
        recorder.timeout = Duration::ZERO;

        scheduler.register(Arc::new(recorder)).unwrap();
        assert_eq!(
            scheduler.get_task("stats").unwrap().timeout,
            SchedulerConfig::default().default_task_timeout()
        );
    }

    #[test]
    fn test_list_tasks_sorted_with_next_run() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        for name in ["stats", "cleanup"] {
            scheduler
                .register(Arc::new(RecordingTask::new(name, &store, Behaviour::Succeed)))
                .unwrap();
        }

        let now = Utc::now();
        let tasks = scheduler.list_tasks();
        assert_eq!(
            tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            ["cleanup", "stats"]
        );
        assert!(tasks.iter().all(|t| t.next_run.is_some_and(|at| at > now)));
        assert!(tasks.iter().all(|t| t.last_run.is_none()));
    }

    #[tokio::test]
    async fn test_run_now_unknown_task() {
        let store = Arc::new(MemoryStore::new());
        let err = scheduler(&store).run_now("missing").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_holds_lock_for_task_timeout() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        let recorder = Arc::new(RecordingTask::new("cleanup", &store, Behaviour::Succeed));
        scheduler.register(recorder.clone()).unwrap();

        let outcome = assert_ok!(scheduler.run_now("cleanup").await);

        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(
            *recorder.lock_ttl_seen.lock().unwrap(),
            Some(KeyTtl::Expires(Duration::from_secs(30)))
        );
        assert_eq!(store.get("task:lock:cleanup").await.unwrap(), None);

        let info = scheduler.get_task("cleanup").unwrap();
        assert!(info.last_run.is_some());
        assert_eq!(info.last_outcome, Some(RunOutcome::Success));
    }

    #[tokio::test]
    async fn test_failed_run_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        scheduler
            .register(Arc::new(RecordingTask::new("stats", &store, Behaviour::Fail)))
            .unwrap();

        assert_eq!(scheduler.run_now("stats").await.unwrap(), RunOutcome::Failure);
        assert_eq!(store.get("task:lock:stats").await.unwrap(), None);
        assert_eq!(
            scheduler.get_task("stats").unwrap().last_outcome,
            Some(RunOutcome::Failure)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_times_out_and_releases_lock() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        let mut recorder = RecordingTask::new("cleanup", &store, Behaviour::Sleep(Duration::from_secs(600)));
        recorder.timeout = Duration::from_secs(5);
        scheduler.register(Arc::new(recorder)).unwrap();

        assert_eq!(scheduler.run_now("cleanup").await.unwrap(), RunOutcome::Timeout);
        assert_eq!(store.get("task:lock:cleanup").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_skipped_while_locked_elsewhere() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(&store);
        let recorder = Arc::new(RecordingTask::new("cleanup", &store, Behaviour::Succeed));
        scheduler.register(recorder.clone()).unwrap();

        let other_instance = TaskLock::new(store.clone(), "task:lock:");
        let held = other_instance
            .try_acquire("cleanup", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(scheduler.run_now("cleanup").await.unwrap(), RunOutcome::Skipped);
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 0);

        held.release().await;
        assert_eq!(scheduler.run_now("cleanup").await.unwrap(), RunOutcome::Success);
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_store_runs_every_time() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = TaskScheduler::new(Arc::new(RedisStore::disabled()), SchedulerConfig::default());
        let mut recorder = RecordingTask::new("stats", &store, Behaviour::Succeed);
        recorder.schedule = cron_expressions::EVERY_HOUR;
        let recorder = Arc::new(recorder);
        scheduler.register(recorder.clone()).unwrap();

        scheduler.run_now("stats").await.unwrap();
        scheduler.run_now("stats").await.unwrap();
        assert_eq!(recorder.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns_immediately() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        };
        let scheduler = TaskScheduler::new(store, config);

        scheduler.start().await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_loop_runs_due_tasks_until_stopped() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            tick_interval_ms: 20,
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(TaskScheduler::new(store.clone(), config));
        let mut recorder = RecordingTask::new("heartbeat", &store, Behaviour::Succeed);
        recorder.schedule = cron_expressions::EVERY_SECOND;
        let recorder = Arc::new(recorder);
        scheduler.register(recorder.clone()).unwrap();

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start().await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start().await, Err(JobError::Scheduler(_))));

        tokio::time::sleep(Duration::from_millis(2200)).await;
        scheduler.stop();
        handle.await.unwrap().unwrap();

        assert!(!scheduler.is_running());
        assert!(recorder.runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(
            scheduler.get_task("heartbeat").unwrap().last_outcome,
            Some(RunOutcome::Success)
        );
    }
}
