//! User entity and write-side inputs.

use crate::domain::{UserRole, UserStatus};
use crate::validation::{key_safe, normalize_identifier};
use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A user account.
///
/// `password_hash` is never serialized, so cached copies carry an empty hash.
/// Paths that need the hash (login) read it from the database directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns the name to show in UIs.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Checks if the account is soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.status == UserStatus::Deleted
    }
}

/// Input for creating a user. The password is already hashed by the caller.
#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 32), custom(function = "key_safe"))]
    pub username: String,
    #[validate(email, custom(function = "key_safe"))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password_hash: String,
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
    pub role: UserRole,
}

impl NewUser {
    /// Creates input for a regular user.
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            display_name: None,
            role: UserRole::default(),
        }
    }

    /// Puts username and email into their stored form.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.username = normalize_identifier(&self.username);
        self.email = normalize_identifier(&self.email);
        self
    }
}

/// Partial update of a user's profile; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Validate)]
pub struct UserChanges {
    #[validate(length(min = 3, max = 32), custom(function = "key_safe"))]
    pub username: Option<String>,
    #[validate(email, custom(function = "key_safe"))]
    pub email: Option<String>,
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

impl UserChanges {
    /// Puts a changed username or email into its stored form.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.username = self.username.as_deref().map(normalize_identifier);
        self.email = self.email.as_deref().map(normalize_identifier);
        self
    }

    /// Applies the changes to `user`, returning the updated copy.
    #[must_use]
    pub fn apply_to(&self, user: &User) -> User {
        let mut updated = user.clone();
        if let Some(username) = &self.username {
            updated.username.clone_from(username);
        }
        if let Some(email) = &self.email {
            updated.email.clone_from(email);
        }
        if let Some(display_name) = &self.display_name {
            updated.display_name = Some(display_name.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            updated.avatar_url = Some(avatar_url.clone());
        }
        if let Some(role) = self.role {
            updated.role = role;
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        updated
    }

    /// Checks if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
            && self.role.is_none()
            && self.status.is_none()
    }
}
