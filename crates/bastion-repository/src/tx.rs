//! Transactional writes with cache invalidation.
//!
//! A transaction opened here is always finished before the helper returns:
//! committed on success, rolled back on error. If the work panics, the
//! transaction is dropped while unwinding and the driver rolls it back.
//!
//! Invalidation runs after the statements succeed and before the commit. If
//! the commit then fails, the deleted entries stay deleted; the next read
//! reloads them from the database.

use async_trait::async_trait;
use bastion_cache::CacheManager;
use bastion_core::{BastionError, BastionResult, BoxFuture};
use sqlx::mysql::MySql;
use sqlx::Transaction;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// An open transaction.
#[async_trait]
pub trait TxHandle: Send + Sized {
    /// Makes the transaction's writes durable.
    async fn commit(self) -> BastionResult<()>;

    /// Discards the transaction's writes.
    async fn rollback(self) -> BastionResult<()>;
}

/// Something that can open transactions.
#[async_trait]
pub trait TxSource: Send + Sync {
    type Tx: TxHandle;

    /// Opens a transaction.
    async fn begin(&self) -> BastionResult<Self::Tx>;

    /// Opens a transaction that rejects writes.
    async fn begin_read_only(&self) -> BastionResult<Self::Tx>;
}

#[async_trait]
impl TxHandle for Transaction<'static, MySql> {
    async fn commit(self) -> BastionResult<()> {
        Ok(Transaction::commit(self).await?)
    }

    async fn rollback(self) -> BastionResult<()> {
        Ok(Transaction::rollback(self).await?)
    }
}

/// One step of a batch. Receives the shared transaction.
pub type TxOp<T> = Box<dyn for<'c> FnOnce(&'c mut T) -> BoxFuture<'c, ()> + Send>;

/// Boxes a closure as a batch step.
pub fn tx_op<T, F>(f: F) -> TxOp<T>
where
    F: for<'c> FnOnce(&'c mut T) -> BoxFuture<'c, ()> + Send + 'static,
{
    Box::new(f)
}

/// Failure of [`UnitOfWork::batch_exec_in_tx`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The step at `index` failed; nothing in the batch was committed.
    #[error("batch operation {index} failed: {source}")]
    Operation { index: usize, source: BastionError },

    /// Opening or committing the transaction failed.
    #[error(transparent)]
    Transaction(#[from] BastionError),
}

impl BatchError {
    /// Index of the failed step, if a step failed.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Operation { index, .. } => Some(*index),
            Self::Transaction(_) => None,
        }
    }
}

/// Runs writes in a transaction and keeps the cache in step with them.
pub struct UnitOfWork<S: TxSource> {
    source: Arc<S>,
    cache: CacheManager,
}

impl<S: TxSource> Clone for UnitOfWork<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
        }
    }
}

impl<S: TxSource> UnitOfWork<S> {
    /// Creates a unit of work over `source`.
    pub fn new(source: Arc<S>, cache: CacheManager) -> Self {
        Self { source, cache }
    }

    /// Runs `f` in a fresh transaction, committing only if it returns `Ok`.
    pub async fn with_tx<R, F>(&self, f: F) -> BastionResult<R>
    where
        R: Send,
        F: for<'c> FnOnce(&'c mut S::Tx) -> BoxFuture<'c, R> + Send,
    {
        let tx = self.source.begin().await?;
        finish(tx, f).await
    }

    /// Runs `f` in a read-only transaction, for reads that must see one
    /// consistent snapshot. Nothing is invalidated.
    pub async fn with_read_only_tx<R, F>(&self, f: F) -> BastionResult<R>
    where
        R: Send,
        F: for<'c> FnOnce(&'c mut S::Tx) -> BoxFuture<'c, R> + Send,
    {
        let tx = self.source.begin_read_only().await?;
        finish(tx, f).await
    }

    /// Like [`Self::with_tx`], deleting the primary entry of `entity` `id`
    /// once `f` succeeds and before the commit.
    pub async fn exec_in_tx<R, F>(&self, entity: &'static str, id: impl Display, f: F) -> BastionResult<R>
    where
        R: Send + 'static,
        F: for<'c> FnOnce(&'c mut S::Tx) -> BoxFuture<'c, R> + Send,
    {
        let key = self.cache.build_key(entity, id);
        let cache = self.cache.clone();

        self.with_tx(move |tx| {
            let work = f(tx);
            Box::pin(async move {
                let value = work.await?;
                cache.invalidate(entity, &[key]).await;
                Ok(value)
            })
        })
        .await
    }

    /// Runs `ops` in order in one transaction.
    ///
    /// The first failing step stops the batch and rolls everything back.
    /// When every step succeeds, `keys` are deleted and the transaction is
    /// committed.
    pub async fn batch_exec_in_tx(
        &self,
        entity: &'static str,
        keys: Vec<String>,
        ops: Vec<TxOp<S::Tx>>,
    ) -> Result<(), BatchError> {
        let mut tx = self.source.begin().await?;
        let total = ops.len();

        for (index, op) in ops.into_iter().enumerate() {
            if let Err(source) = op(&mut tx).await {
                warn!(entity = %entity, index, total, error = %source, "Batch operation failed, rolling back");
                rollback(tx).await;
                return Err(BatchError::Operation { index, source });
            }
        }

        self.cache.invalidate(entity, &keys).await;
        tx.commit().await?;
        debug!(entity = %entity, total, "Batch committed");
        Ok(())
    }
}

/// Runs `f` on `tx`, then commits or rolls back depending on its outcome.
async fn finish<T, R, F>(mut tx: T, f: F) -> BastionResult<R>
where
    T: TxHandle,
    F: for<'c> FnOnce(&'c mut T) -> BoxFuture<'c, R>,
{
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            rollback(tx).await;
            Err(e)
        }
    }
}

async fn rollback<T: TxHandle>(tx: T) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_cache::{KeyValueStore, MemoryStore};
    use bastion_config::CacheConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transaction fake that records what happened to it.
    struct FakeTx {
        journal: Arc<Mutex<Vec<String>>>,
        fail_commit: bool,
        finished: bool,
    }

    impl FakeTx {
        fn exec(&mut self, statement: &str) {
            self.journal.lock().unwrap().push(format!("exec {statement}"));
        }
    }

    #[async_trait]
    impl TxHandle for FakeTx {
        async fn commit(mut self) -> BastionResult<()> {
            self.finished = true;
            if self.fail_commit {
                self.journal.lock().unwrap().push("commit failed".to_string());
                return Err(BastionError::Database("lock wait timeout".to_string()));
            }
            self.journal.lock().unwrap().push("commit".to_string());
            Ok(())
        }

        async fn rollback(mut self) -> BastionResult<()> {
            self.finished = true;
            self.journal.lock().unwrap().push("rollback".to_string());
            Ok(())
        }
    }

    impl Drop for FakeTx {
        fn drop(&mut self) {
            if !self.finished {
                self.journal.lock().unwrap().push("rollback on drop".to_string());
            }
        }
    }

    #[derive(Default)]
    struct FakeSource {
        journal: Arc<Mutex<Vec<String>>>,
        fail_commit: bool,
    }

    #[async_trait]
    impl TxSource for FakeSource {
        type Tx = FakeTx;

        async fn begin(&self) -> BastionResult<FakeTx> {
            self.journal.lock().unwrap().push("begin".to_string());
            Ok(self.open())
        }

        async fn begin_read_only(&self) -> BastionResult<FakeTx> {
            self.journal.lock().unwrap().push("begin read only".to_string());
            Ok(self.open())
        }
    }

    impl FakeSource {
        fn open(&self) -> FakeTx {
            FakeTx {
                journal: Arc::clone(&self.journal),
                fail_commit: self.fail_commit,
                finished: false,
            }
        }
    }

    fn setup(fail_commit: bool) -> (Arc<Mutex<Vec<String>>>, Arc<MemoryStore>, UnitOfWork<FakeSource>) {
        let source = FakeSource {
            fail_commit,
            ..Default::default()
        };
        let journal = Arc::clone(&source.journal);
        let store = Arc::new(MemoryStore::new());
        let cache = CacheManager::new(store.clone(), &CacheConfig::default());
        (journal, store, UnitOfWork::new(Arc::new(source), cache))
    }

    fn events(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_with_tx_commits_on_success() {
        let (journal, _store, uow) = setup(false);

        let out = uow
            .with_tx::<i32, _>(|tx| {
                Box::pin(async move {
                    tx.exec("insert");
                    Ok(7)
                })
            })
            .await
            .unwrap();

        assert_eq!(out, 7);
        assert_eq!(events(&journal), ["begin", "exec insert", "commit"]);
    }

    #[tokio::test]
    async fn test_with_tx_rolls_back_on_error() {
        let (journal, _store, uow) = setup(false);

        let err = uow
            .with_tx::<(), _>(|tx| {
                Box::pin(async move {
                    tx.exec("insert");
                    Err(BastionError::conflict("duplicate"))
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err, BastionError::conflict("duplicate"));
        assert_eq!(events(&journal), ["begin", "exec insert", "rollback"]);
    }

    #[tokio::test]
    async fn test_with_tx_rolls_back_on_panic() {
        let (journal, _store, uow) = setup(false);

        let handle = tokio::spawn(async move {
            uow.with_tx::<(), _>(|tx| {
                Box::pin(async move {
                    tx.exec("insert");
                    let explode = true;
                    if explode {
                        panic!("write path exploded");
                    }
                    Ok(())
                })
            })
            .await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(events(&journal), ["begin", "exec insert", "rollback on drop"]);
    }

    #[tokio::test]
    async fn test_read_only_tx_leaves_cache_alone() {
        let (journal, store, uow) = setup(false);
        store.set("cache:user:7", "{}", Duration::from_secs(60)).await.unwrap();

        let count = uow
            .with_read_only_tx::<u64, _>(|tx| {
                Box::pin(async move {
                    tx.exec("select");
                    Ok(3)
                })
            })
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(events(&journal), ["begin read only", "exec select", "commit"]);
        assert!(store.get("cache:user:7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exec_in_tx_returns_owned_value() {
        let (journal, store, uow) = setup(false);
        store.set("cache:user:9", "{}", Duration::from_secs(60)).await.unwrap();

        let name = uow
            .exec_in_tx::<String, _>("user", 9, |tx| {
                Box::pin(async move {
                    tx.exec("update");
                    Ok("renamed".to_string())
                })
            })
            .await
            .unwrap();

        assert_eq!(name, "renamed");
        assert_eq!(store.get("cache:user:9").await.unwrap(), None);
        assert_eq!(events(&journal), ["begin", "exec update", "commit"]);
    }

    #[tokio::test]
    async fn test_exec_in_tx_invalidates_before_commit() {
        let (journal, store, uow) = setup(true);
        store.set("cache:user:7", "{}", Duration::from_secs(60)).await.unwrap();

        let err = uow
            .exec_in_tx::<(), _>("user", 7, |tx| {
                Box::pin(async move {
                    tx.exec("update");
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        // the commit failed, but the entry was already gone
        assert!(matches!(err, BastionError::Database(_)));
        assert_eq!(store.get("cache:user:7").await.unwrap(), None);
        assert_eq!(events(&journal), ["begin", "exec update", "commit failed"]);
    }

    #[tokio::test]
    async fn test_exec_in_tx_failure_keeps_cache() {
        let (_journal, store, uow) = setup(false);
        store.set("cache:user:7", "{}", Duration::from_secs(60)).await.unwrap();

        let result = uow
            .exec_in_tx::<(), _>("user", 7, |_tx| {
                Box::pin(async { Err(BastionError::not_found("user", 7)) })
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert!(store.get("cache:user:7").await.unwrap().is_some());
    }

    fn step(name: &'static str, fail: bool) -> TxOp<FakeTx> {
        tx_op(move |tx: &mut FakeTx| {
            Box::pin(async move {
                tx.exec(name);
                if fail {
                    return Err(BastionError::Database(format!("{name} failed")));
                }
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_batch_reports_failing_index() {
        let (journal, store, uow) = setup(false);
        store.set("cache:user:1", "{}", Duration::from_secs(60)).await.unwrap();

        let err = uow
            .batch_exec_in_tx(
                "user",
                vec!["cache:user:1".to_string()],
                vec![step("a", false), step("b", true), step("c", false)],
            )
            .await
            .unwrap_err();

        assert_eq!(err.index(), Some(1));
        assert_eq!(events(&journal), ["begin", "exec a", "exec b", "rollback"]);
        assert!(store.get("cache:user:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_commits_and_invalidates() {
        let (journal, store, uow) = setup(false);
        store.set("cache:user:1", "{}", Duration::from_secs(60)).await.unwrap();
        store.set("cache:user:2", "{}", Duration::from_secs(60)).await.unwrap();

        uow.batch_exec_in_tx(
            "user",
            vec!["cache:user:1".to_string(), "cache:user:2".to_string()],
            vec![step("a", false), step("b", false)],
        )
        .await
        .unwrap();

        assert_eq!(events(&journal), ["begin", "exec a", "exec b", "commit"]);
        assert!(store.is_empty());
    }
}
