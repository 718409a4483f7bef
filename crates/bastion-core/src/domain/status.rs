//! User account status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// User account is active.
    #[default]
    Active,
    /// User account is disabled by an administrator.
    Disabled,
    /// User account is deleted (soft delete).
    Deleted,
}

impl UserStatus {
    /// Checks if the user can log in.
    #[must_use]
    pub const fn can_login(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Storage representation in the `users.status` column.
    #[must_use]
    pub const fn as_i16(&self) -> i16 {
        match self {
            Self::Active => 1,
            Self::Disabled => 0,
            Self::Deleted => -1,
        }
    }

    /// Decodes the `users.status` column; unknown codes map to `Disabled`.
    #[must_use]
    pub const fn from_i16(code: i16) -> Self {
        match code {
            1 => Self::Active,
            -1 => Self::Deleted,
            _ => Self::Disabled,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}
