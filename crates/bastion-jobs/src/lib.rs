//! # Bastion Jobs
//!
//! Cron-driven periodic tasks that run at most once per slot across every
//! instance of the service.
//!
//! ```text
//! TaskScheduler
//!   ├─ tick loop        (tokio interval, broadcast shutdown)
//!   ├─ cron::Schedule   (six fields, seconds first)
//!   └─ TaskLock         (SET NX with TTL = task timeout)
//!        └─ Arc<dyn KeyValueStore>
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use bastion_jobs::{Task, TaskScheduler, JobResult};
//!
//! struct Heartbeat;
//!
//! #[async_trait::async_trait]
//! impl Task for Heartbeat {
//!     fn name(&self) -> &str { "heartbeat" }
//!     fn schedule(&self) -> &str { "0 * * * * *" }
//!     async fn run(&self) -> JobResult<()> { Ok(()) }
//! }
//!
//! scheduler.register(Arc::new(Heartbeat))?;
//! scheduler.start().await?;
//! ```

pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod task;

pub use error::{JobError, JobResult};
pub use metrics::{register_metrics, SchedulerMetrics};
pub use scheduler::{cron_expressions, RunOutcome, TaskInfo, TaskScheduler};
pub use task::{Task, DEFAULT_TASK_TIMEOUT};
