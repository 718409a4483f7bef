//! Repository trait definitions.

use async_trait::async_trait;
use bastion_core::{BastionResult, NewUser, Page, PageRequest, User, UserChanges, UserId};

/// User repository trait.
///
/// Lookups fail with `NotFound` for missing and soft-deleted users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by ID.
    async fn get_user_by_id(&self, id: UserId) -> BastionResult<User>;

    /// Finds a user by username.
    async fn get_user_by_username(&self, username: &str) -> BastionResult<User>;

    /// Finds a user by email.
    async fn get_user_by_email(&self, email: &str) -> BastionResult<User>;

    /// Lists users with pagination.
    async fn list_users(&self, page: PageRequest) -> BastionResult<Page<User>>;

    /// Counts users.
    async fn count_users(&self) -> BastionResult<u64>;

    /// Creates a user.
    async fn create_user(&self, new_user: NewUser) -> BastionResult<User>;

    /// Applies `changes` to an existing user.
    async fn update_user(&self, id: UserId, changes: UserChanges) -> BastionResult<User>;

    /// Replaces a user's password hash.
    async fn update_user_password(&self, id: UserId, password_hash: &str) -> BastionResult<()>;

    /// Soft-deletes a user.
    async fn delete_user(&self, id: UserId) -> BastionResult<()>;
}
