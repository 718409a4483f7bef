//! User repository bound to an open transaction.
//!
//! Reads go straight to the transaction so the caller sees its own
//! uncommitted writes; nothing read here is cached. Writes delete the same
//! cache entries as [`CachedUserRepository`] right after their statement,
//! which is before the surrounding [`UnitOfWork`](crate::UnitOfWork)
//! commits.

use super::user_repository::{CachedUserRepository, USER_ENTITY};
use crate::mysql::TxUserDao;
use bastion_core::{BastionError, BastionResult, NewUser, User, UserChanges, UserId, ValidateExt};
use tracing::{debug, info};

/// User reads and writes inside one transaction.
pub struct TxUserRepository<'t> {
    repo: CachedUserRepository,
    dao: TxUserDao<'t>,
}

impl<'t> TxUserRepository<'t> {
    pub(crate) fn new(repo: CachedUserRepository, dao: TxUserDao<'t>) -> Self {
        Self { repo, dao }
    }

    async fn invalidate(&self, id: UserId, mut keys: Vec<String>) {
        keys.insert(0, self.repo.cache().build_key(USER_ENTITY, id));
        self.repo.cache().invalidate(USER_ENTITY, &keys).await;
    }

    async fn load(&mut self, id: UserId) -> BastionResult<User> {
        self.dao
            .find_by_id(id)
            .await?
            .ok_or_else(|| BastionError::not_found(USER_ENTITY, id))
    }

    /// Finds a user as this transaction sees it.
    pub async fn get_user_by_id(&mut self, id: UserId) -> BastionResult<User> {
        self.load(id).await
    }

    /// Resolves a username as this transaction sees it.
    pub async fn get_user_by_username(&mut self, username: &str) -> BastionResult<User> {
        match self.dao.find_id_by_username(username).await? {
            Some(id) => self.load(id).await,
            None => Err(BastionError::not_found(USER_ENTITY, username)),
        }
    }

    /// Counts users as this transaction sees them.
    pub async fn count_users(&mut self) -> BastionResult<u64> {
        self.dao.count().await
    }

    pub async fn create_user(&mut self, new_user: NewUser) -> BastionResult<User> {
        let new_user = new_user.normalized();
        new_user.validate_input()?;
        let created = self.dao.insert(&new_user).await?;

        let keys = self.repo.created_keys(&created);
        self.repo.cache().invalidate(USER_ENTITY, &keys).await;

        info!(user_id = %created.id, username = %created.username, "User created in transaction");
        Ok(created)
    }

    pub async fn update_user(&mut self, id: UserId, changes: UserChanges) -> BastionResult<User> {
        let changes = changes.normalized();
        changes.validate_input()?;
        let current = self.load(id).await?;
        if changes.is_empty() {
            return Ok(current);
        }

        let updated = changes.apply_to(&current);
        let keys = self.repo.updated_keys(&current, &updated);

        debug!(user_id = %id, keys = ?keys, "Updating user in transaction");
        let updated = self.dao.update(&updated).await?;
        self.invalidate(id, keys).await;
        Ok(updated)
    }

    pub async fn update_user_password(&mut self, id: UserId, password_hash: &str) -> BastionResult<()> {
        if password_hash.is_empty() {
            return Err(BastionError::validation("password_hash: must not be empty"));
        }

        self.dao.update_password(id, password_hash).await?;
        self.invalidate(id, Vec::new()).await;
        Ok(())
    }

    pub async fn delete_user(&mut self, id: UserId) -> BastionResult<()> {
        let current = self.load(id).await?;
        let keys = self.repo.deleted_keys(&current);

        if !self.dao.soft_delete(id).await? {
            return Err(BastionError::not_found(USER_ENTITY, id));
        }
        self.invalidate(id, keys).await;

        info!(user_id = %id, "User deleted in transaction");
        Ok(())
    }
}
