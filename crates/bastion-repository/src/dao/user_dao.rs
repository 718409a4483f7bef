//! UserDao trait: uncached user data access.

use async_trait::async_trait;
use bastion_core::{BastionResult, NewUser, PageRequest, User, UserId};

/// Low-level user data access object.
///
/// Soft-deleted users are invisible to every lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDao: Send + Sync {
    /// Finds a user by ID.
    async fn find_by_id(&self, id: UserId) -> BastionResult<Option<User>>;

    /// Resolves a username to a user ID.
    async fn find_id_by_username(&self, username: &str) -> BastionResult<Option<UserId>>;

    /// Resolves an email address to a user ID.
    async fn find_id_by_email(&self, email: &str) -> BastionResult<Option<UserId>>;

    /// Lists users ordered by ID.
    async fn list(&self, page: PageRequest) -> BastionResult<Vec<User>>;

    /// Counts users.
    async fn count(&self) -> BastionResult<u64>;

    /// Persists a new user and returns it with its assigned ID.
    async fn insert(&self, new_user: &NewUser) -> BastionResult<User>;

    /// Writes the profile fields of `user`. Fails with `NotFound` if the
    /// user does not exist.
    async fn update(&self, user: &User) -> BastionResult<User>;

    /// Replaces the password hash. Fails with `NotFound` if the user does
    /// not exist.
    async fn update_password(&self, id: UserId, password_hash: &str) -> BastionResult<()>;

    /// Marks the user deleted. Returns `false` if there was no such user.
    async fn soft_delete(&self, id: UserId) -> BastionResult<bool>;
}
