//! Roles and the permission table used for RBAC checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission identifiers in `resource:action` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "user:read")]
    UserRead,
    #[serde(rename = "user:write")]
    UserWrite,
    #[serde(rename = "user:delete")]
    UserDelete,
    #[serde(rename = "content:read")]
    ContentRead,
    #[serde(rename = "content:write")]
    ContentWrite,
    #[serde(rename = "content:delete")]
    ContentDelete,
    #[serde(rename = "content:audit")]
    ContentAudit,
    #[serde(rename = "system:config")]
    SystemConfig,
    #[serde(rename = "system:monitor")]
    SystemMonitor,
}

impl Permission {
    /// Returns the `resource:action` form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRead => "user:read",
            Self::UserWrite => "user:write",
            Self::UserDelete => "user:delete",
            Self::ContentRead => "content:read",
            Self::ContentWrite => "content:write",
            Self::ContentDelete => "content:delete",
            Self::ContentAudit => "content:audit",
            Self::SystemConfig => "system:config",
            Self::SystemMonitor => "system:monitor",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Permission::{
    ContentAudit, ContentDelete, ContentRead, ContentWrite, SystemConfig, SystemMonitor, UserDelete, UserRead,
    UserWrite,
};

const GUEST_PERMISSIONS: &[Permission] = &[ContentRead];
const USER_PERMISSIONS: &[Permission] = &[UserRead, ContentRead, ContentWrite];
const MODERATOR_PERMISSIONS: &[Permission] = &[UserRead, ContentRead, ContentWrite, ContentDelete, ContentAudit];
const ADMIN_PERMISSIONS: &[Permission] = &[
    UserRead,
    UserWrite,
    UserDelete,
    ContentRead,
    ContentWrite,
    ContentDelete,
    ContentAudit,
    SystemMonitor,
];
const SUPER_ADMIN_PERMISSIONS: &[Permission] = &[
    UserRead,
    UserWrite,
    UserDelete,
    ContentRead,
    ContentWrite,
    ContentDelete,
    ContentAudit,
    SystemConfig,
    SystemMonitor,
];

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Anonymous or unverified visitor.
    Guest,
    /// Regular user.
    #[default]
    User,
    /// Content moderator.
    Moderator,
    /// Administrator.
    Admin,
    /// System owner.
    SuperAdmin,
}

impl UserRole {
    /// Returns the permission set granted to this role.
    #[must_use]
    pub const fn permissions(&self) -> &'static [Permission] {
        match self {
            Self::Guest => GUEST_PERMISSIONS,
            Self::User => USER_PERMISSIONS,
            Self::Moderator => MODERATOR_PERMISSIONS,
            Self::Admin => ADMIN_PERMISSIONS,
            Self::SuperAdmin => SUPER_ADMIN_PERMISSIONS,
        }
    }

    /// Checks whether this role grants `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Returns the storage/wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Returns all available roles.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [Self::Guest, Self::User, Self::Moderator, Self::Admin, Self::SuperAdmin]
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = crate::BastionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "user" => Ok(Self::User),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            other => Err(crate::BastionError::conversion(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_is_read_only() {
        assert!(UserRole::Guest.has_permission(Permission::ContentRead));
        assert!(!UserRole::Guest.has_permission(Permission::ContentWrite));
        assert!(!UserRole::Guest.has_permission(Permission::UserRead));
    }

    #[test]
    fn test_moderator_audits_but_does_not_manage_users() {
        assert!(UserRole::Moderator.has_permission(Permission::ContentAudit));
        assert!(!UserRole::Moderator.has_permission(Permission::UserDelete));
    }

    #[test]
    fn test_only_super_admin_configures_system() {
        for role in UserRole::all() {
            assert_eq!(
                role.has_permission(Permission::SystemConfig),
                role == UserRole::SuperAdmin,
                "role {role}"
            );
        }
    }

    #[test]
    fn test_role_round_trip() {
        for role in UserRole::all() {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_permission_serialization() {
        let json = serde_json::to_string(&Permission::SystemMonitor).unwrap();
        assert_eq!(json, "\"system:monitor\"");
    }
}
