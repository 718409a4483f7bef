//! User repository backed by the read-through cache.
//!
//! Key layout:
//!
//! ```text
//! cache:user:<id>                  user, user_ttl
//! cache:user:username:<username>   id,   user_ttl x index multiplier
//! cache:user:email:<email>         id,   user_ttl x index multiplier
//! cache:user_count:total           u64,  user_count_ttl
//! ```
//!
//! Usernames and emails are normalized (trimmed, lowercased) before they are
//! stored, looked up or put into a key. The columns compare byte-for-byte,
//! so each row is reachable through exactly one index key per field.

use super::tx_user_repository::TxUserRepository;
use crate::dao::UserDao;
use crate::mysql::TxUserDao;
use crate::traits::UserRepository;
use async_trait::async_trait;
use bastion_cache::CacheManager;
use bastion_config::CacheConfig;
use bastion_core::{
    key_safe, normalize_identifier, BastionError, BastionResult, NewUser, Page, PageRequest, User, UserChanges,
    UserId, ValidateExt,
};
use sqlx::MySqlConnection;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Entity name of cached users.
pub const USER_ENTITY: &str = "user";
/// Entity name of the cached user count.
pub const USER_COUNT_ENTITY: &str = "user_count";

const COUNT_ID: &str = "total";
const USERNAME_FIELD: &str = "username";
const EMAIL_FIELD: &str = "email";

/// Cached user repository.
#[derive(Clone)]
pub struct CachedUserRepository {
    dao: Arc<dyn UserDao>,
    cache: CacheManager,
    user_ttl: Duration,
    count_ttl: Duration,
}

impl CachedUserRepository {
    /// Creates a repository over `dao` caching through `cache`.
    pub fn new(dao: Arc<dyn UserDao>, cache: CacheManager, config: &CacheConfig) -> Self {
        let config = config.clone().normalized();
        Self {
            dao,
            cache,
            user_ttl: config.user_ttl(),
            count_ttl: config.user_count_ttl(),
        }
    }

    /// Returns the cache engine.
    #[must_use]
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Binds the repository's writes to an open transaction.
    ///
    /// ```ignore
    /// let users = repo.clone();
    /// uow.with_tx(move |tx| Box::pin(async move {
    ///     let mut scoped = users.with_tx(tx);
    ///     scoped.update_user(id, changes).await
    /// }))
    /// .await?;
    /// ```
    pub fn with_tx<'t>(&self, conn: &'t mut MySqlConnection) -> TxUserRepository<'t> {
        TxUserRepository::new(self.clone(), TxUserDao::new(conn))
    }

    fn username_key(&self, username: &str) -> String {
        self.cache
            .build_index_key(USER_ENTITY, USERNAME_FIELD, normalize_identifier(username))
    }

    fn email_key(&self, email: &str) -> String {
        self.cache
            .build_index_key(USER_ENTITY, EMAIL_FIELD, normalize_identifier(email))
    }

    fn count_key(&self) -> String {
        self.cache.build_key(USER_COUNT_ENTITY, COUNT_ID)
    }

    /// Entries a fresh insert makes stale: "not found" markers for the new
    /// id and identifiers, and the count.
    pub(crate) fn created_keys(&self, created: &User) -> Vec<String> {
        vec![
            self.cache.build_key(USER_ENTITY, created.id),
            self.username_key(&created.username),
            self.email_key(&created.email),
            self.count_key(),
        ]
    }

    /// Index entries naming either the old or the new identifiers, plus the
    /// count when the status moves.
    pub(crate) fn updated_keys(&self, current: &User, updated: &User) -> Vec<String> {
        let mut keys = vec![self.username_key(&current.username), self.email_key(&current.email)];
        for key in [self.username_key(&updated.username), self.email_key(&updated.email)] {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if updated.status != current.status {
            keys.push(self.count_key());
        }
        keys
    }

    pub(crate) fn deleted_keys(&self, current: &User) -> Vec<String> {
        vec![
            self.username_key(&current.username),
            self.email_key(&current.email),
            self.count_key(),
        ]
    }

    async fn take_by_index<L, Fut>(&self, field: &'static str, raw: &str, lookup: L) -> BastionResult<User>
    where
        L: FnOnce(Arc<dyn UserDao>, String) -> Fut + Send + 'static,
        Fut: Future<Output = BastionResult<Option<UserId>>> + Send + 'static,
    {
        let value = normalize_identifier(raw);
        // such a value can't belong to a user and must not reach a key
        if key_safe(&value).is_err() {
            return Err(BastionError::not_found(USER_ENTITY, raw));
        }

        let lookup_value = value.clone();
        let index_dao = Arc::clone(&self.dao);
        let data_dao = Arc::clone(&self.dao);

        self.cache
            .take_by_index(
                USER_ENTITY,
                field,
                &value,
                self.user_ttl,
                move || async move {
                    lookup(index_dao, lookup_value.clone())
                        .await?
                        .ok_or_else(|| BastionError::not_found(USER_ENTITY, lookup_value))
                },
                move |id: UserId| load_user(data_dao, id),
                UserId::parse,
            )
            .await
    }
}

async fn load_user(dao: Arc<dyn UserDao>, id: UserId) -> BastionResult<User> {
    dao.find_by_id(id)
        .await?
        .ok_or_else(|| BastionError::not_found(USER_ENTITY, id))
}

#[async_trait]
impl UserRepository for CachedUserRepository {
    async fn get_user_by_id(&self, id: UserId) -> BastionResult<User> {
        let dao = Arc::clone(&self.dao);
        self.cache
            .take_by_id(USER_ENTITY, id, self.user_ttl, move || load_user(dao, id))
            .await
    }

    async fn get_user_by_username(&self, username: &str) -> BastionResult<User> {
        self.take_by_index(USERNAME_FIELD, username, |dao, value| async move {
            dao.find_id_by_username(&value).await
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> BastionResult<User> {
        self.take_by_index(EMAIL_FIELD, email, |dao, value| async move {
            dao.find_id_by_email(&value).await
        })
        .await
    }

    async fn list_users(&self, page: PageRequest) -> BastionResult<Page<User>> {
        let content = self
            .dao
            .list(page)
            .await?
            .into_iter()
            .map(|mut user| {
                user.password_hash.clear();
                user
            })
            .collect();
        let total = self.count_users().await?;
        Ok(Page::new(content, page, total))
    }

    async fn count_users(&self) -> BastionResult<u64> {
        let dao = Arc::clone(&self.dao);
        self.cache
            .take_by_id(USER_COUNT_ENTITY, COUNT_ID, self.count_ttl, move || async move {
                dao.count().await
            })
            .await
    }

    async fn create_user(&self, new_user: NewUser) -> BastionResult<User> {
        let new_user = new_user.normalized();
        new_user.validate_input()?;
        let created = self.dao.insert(&new_user).await?;

        // lookups made before the insert may have cached "not found"
        self.cache.invalidate(USER_ENTITY, &self.created_keys(&created)).await;

        info!(user_id = %created.id, username = %created.username, "User created");
        Ok(created)
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> BastionResult<User> {
        let changes = changes.normalized();
        changes.validate_input()?;
        let current = load_user(Arc::clone(&self.dao), id).await?;
        if changes.is_empty() {
            return Ok(current);
        }

        let updated = changes.apply_to(&current);
        let keys = self.updated_keys(&current, &updated);

        debug!(user_id = %id, keys = ?keys, "Updating user");
        let dao = Arc::clone(&self.dao);
        self.cache
            .exec_by_id_with_indexes(USER_ENTITY, id, keys, move || async move { dao.update(&updated).await })
            .await
    }

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> BastionResult<()> {
        if password_hash.is_empty() {
            return Err(BastionError::validation("password_hash: must not be empty"));
        }

        let dao = Arc::clone(&self.dao);
        let password_hash = password_hash.to_string();
        self.cache
            .exec_by_id(USER_ENTITY, id, move || async move {
                dao.update_password(id, &password_hash).await
            })
            .await
    }

    async fn delete_user(&self, id: UserId) -> BastionResult<()> {
        let current = load_user(Arc::clone(&self.dao), id).await?;
        let keys = self.deleted_keys(&current);

        let dao = Arc::clone(&self.dao);
        self.cache
            .exec_by_id_with_indexes(USER_ENTITY, id, keys, move || async move {
                if dao.soft_delete(id).await? {
                    Ok(())
                } else {
                    Err(BastionError::not_found(USER_ENTITY, id))
                }
            })
            .await?;

        info!(user_id = %id, "User deleted");
        Ok(())
    }
}
