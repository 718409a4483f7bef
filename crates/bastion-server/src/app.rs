//! Application wiring.

use crate::tasks::register_builtin_tasks;
use bastion_cache::{CacheManager, KeyValueStore, RedisStore};
use bastion_config::{AppConfig, RedisConfig};
use bastion_core::BastionResult;
use bastion_jobs::TaskScheduler;
use bastion_repository::{CachedUserRepository, DatabasePool, MySqlUserDao, UnitOfWork, UserDao, UserRepository};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Connects the shared key-value store, or returns an inert one when Redis
/// is disabled.
pub async fn connect_store(config: &RedisConfig) -> BastionResult<Arc<dyn KeyValueStore>> {
    if !config.enabled {
        warn!("Redis disabled: cache reads will miss and task locks are not shared");
        return Ok(Arc::new(RedisStore::disabled()));
    }

    let pool = bastion_cache::create_pool(config).await?;
    Ok(Arc::new(RedisStore::new(Arc::new(pool))))
}

/// Running application: pools, cache, repository and scheduler.
pub struct App {
    db_pool: Arc<DatabasePool>,
    users: Arc<CachedUserRepository>,
    scheduler: Arc<TaskScheduler>,
}

impl App {
    /// Connects every backend and registers the built-in tasks.
    pub async fn build(config: &AppConfig) -> BastionResult<Self> {
        let db_pool = bastion_repository::create_pool(&config.database).await?;
        db_pool.run_migrations().await?;

        let store = connect_store(&config.redis).await?;
        let cache = CacheManager::new(Arc::clone(&store), &config.cache);

        let dao: Arc<dyn UserDao> = Arc::new(MySqlUserDao::new(Arc::clone(&db_pool)));
        let users = Arc::new(CachedUserRepository::new(Arc::clone(&dao), cache, &config.cache));

        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&store), config.scheduler.clone()));
        register_builtin_tasks(&scheduler, store, dao);

        Ok(Self::from_parts(db_pool, users, scheduler))
    }

    /// Assembles an application from already-built parts.
    pub fn from_parts(
        db_pool: Arc<DatabasePool>,
        users: Arc<CachedUserRepository>,
        scheduler: Arc<TaskScheduler>,
    ) -> Self {
        Self {
            db_pool,
            users,
            scheduler,
        }
    }

    /// The cached user repository.
    pub fn users(&self) -> Arc<dyn UserRepository> {
        self.users.clone()
    }

    /// A unit of work over the database pool, invalidating through the
    /// same cache as [`Self::users`].
    pub fn unit_of_work(&self) -> UnitOfWork<DatabasePool> {
        UnitOfWork::new(Arc::clone(&self.db_pool), self.users.cache().clone())
    }

    /// The cached user repository, for binding writes to a transaction
    /// with [`CachedUserRepository::with_tx`].
    pub fn cached_users(&self) -> &Arc<CachedUserRepository> {
        &self.users
    }

    /// The task scheduler.
    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Runs the scheduler until `shutdown` resolves, then stops it and
    /// closes the database pool.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> BastionResult<()> {
        self.db_pool.health_check().await?;
        let total = self.users.count_users().await?;
        info!(total_users = total, "Repository ready");

        let scheduler = Arc::clone(&self.scheduler);
        let handle = tokio::spawn(async move { scheduler.start().await });

        shutdown.await;
        self.scheduler.stop();

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Scheduler exited with an error"),
            Err(e) => error!(error = %e, "Scheduler task aborted"),
        }

        self.db_pool.close().await;
        info!("Shutdown complete");
        Ok(())
    }
}
