//! Hourly user statistics.

use async_trait::async_trait;
use bastion_jobs::{cron_expressions, JobResult, Task};
use bastion_repository::UserDao;
use metrics::{describe_gauge, gauge};
use std::sync::Arc;
use tracing::info;

/// Gauge holding the last computed user total.
pub const USERS_TOTAL: &str = "bastion_users_total";

/// Counts users straight from the database, bypassing the cache.
pub struct UserStatsTask {
    dao: Arc<dyn UserDao>,
}

impl UserStatsTask {
    /// Creates the task over the uncached DAO.
    pub fn new(dao: Arc<dyn UserDao>) -> Self {
        describe_gauge!(USERS_TOTAL, "Number of users at the last statistics run");
        Self { dao }
    }
}

#[async_trait]
impl Task for UserStatsTask {
    fn name(&self) -> &str {
        "user_stats"
    }

    fn schedule(&self) -> &str {
        cron_expressions::EVERY_HOUR
    }

    #[allow(clippy::cast_precision_loss)]
    async fn run(&self) -> JobResult<()> {
        let total = self.dao.count().await?;
        gauge!(USERS_TOTAL).set(total as f64);
        info!(total_users = total, "User statistics calculated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{BastionError, BastionResult, NewUser, PageRequest, User, UserId};
    use bastion_jobs::{JobError, DEFAULT_TASK_TIMEOUT};
    use mockall::mock;

    mock! {
        Dao {}

        #[async_trait]
        impl UserDao for Dao {
            async fn find_by_id(&self, id: UserId) -> BastionResult<Option<User>>;
            async fn find_id_by_username(&self, username: &str) -> BastionResult<Option<UserId>>;
            async fn find_id_by_email(&self, email: &str) -> BastionResult<Option<UserId>>;
            async fn list(&self, page: PageRequest) -> BastionResult<Vec<User>>;
            async fn count(&self) -> BastionResult<u64>;
            async fn insert(&self, new_user: &NewUser) -> BastionResult<User>;
            async fn update(&self, user: &User) -> BastionResult<User>;
            async fn update_password(&self, id: UserId, password_hash: &str) -> BastionResult<()>;
            async fn soft_delete(&self, id: UserId) -> BastionResult<bool>;
        }
    }

    #[tokio::test]
    async fn test_counts_through_the_dao() {
        let mut dao = MockDao::new();
        dao.expect_count().times(1).returning(|| Ok(42));

        let task = UserStatsTask::new(Arc::new(dao));
        assert!(task.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_database_failure_fails_the_run() {
        let mut dao = MockDao::new();
        dao.expect_count()
            .returning(|| Err(BastionError::Database("connection refused".into())));

        let err = UserStatsTask::new(Arc::new(dao)).run().await.unwrap_err();
        assert!(matches!(err, JobError::ExecutionFailed(msg) if msg.contains("connection refused")));
    }

    #[test]
    fn test_schedule_and_timeout() {
        let task = UserStatsTask::new(Arc::new(MockDao::new()));
        assert_eq!(task.name(), "user_stats");
        assert_eq!(task.schedule(), "0 0 * * * *");
        assert_eq!(task.timeout(), DEFAULT_TASK_TIMEOUT);
    }
}
