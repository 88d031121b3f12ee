use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub codename: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub codename: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub permissions: Vec<Permission>,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub codename: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub codename: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub codename: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub codename: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePermission {
    pub codename: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPermissions {
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetGroups {
    pub group_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMember {
    pub user_id: Uuid,
}

fn default_true() -> bool {
    true
}

/// Codenames are lowercase `resource:action` style identifiers.
pub fn is_valid_codename(codename: &str) -> bool {
    !codename.is_empty()
        && codename.len() <= 100
        && codename
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | ':' | '.' | '-'))
}

/// Entry of the built-in permission catalog seeded at start-up.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPermission {
    pub codename: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

pub fn builtin_permissions() -> &'static [BuiltinPermission] {
    use crate::permissions::codes::*;

    const CATALOG: &[BuiltinPermission] = &[
        // User Management
        BuiltinPermission { codename: USERS_READ, name: "View Users", description: "View user accounts and their groups", category: "User Management" },
        BuiltinPermission { codename: USERS_WRITE, name: "Manage Users", description: "Create, edit, lock and unlock user accounts", category: "User Management" },
        BuiltinPermission { codename: USERS_DELETE, name: "Delete Users", description: "Delete user accounts", category: "User Management" },

        // Access Control
        BuiltinPermission { codename: GROUPS_READ, name: "View Groups", description: "View groups and their members", category: "Access Control" },
        BuiltinPermission { codename: GROUPS_WRITE, name: "Manage Groups", description: "Create and edit groups, assign members and permissions", category: "Access Control" },
        BuiltinPermission { codename: GROUPS_DELETE, name: "Delete Groups", description: "Delete non-system groups", category: "Access Control" },
        BuiltinPermission { codename: PERMISSIONS_READ, name: "View Permissions", description: "View the permission catalog", category: "Access Control" },
        BuiltinPermission { codename: PERMISSIONS_WRITE, name: "Manage Permissions", description: "Create and edit permissions", category: "Access Control" },
        BuiltinPermission { codename: PERMISSIONS_DELETE, name: "Delete Permissions", description: "Delete permissions", category: "Access Control" },

        // Notifications
        BuiltinPermission { codename: NOTIFICATIONS_CREATE, name: "Send Notifications", description: "Create notifications for other users", category: "Notifications" },
        BuiltinPermission { codename: NOTIFICATIONS_MONITOR, name: "Monitor Notifications", description: "Subscribe to the notification feed of all users", category: "Notifications" },

        // Activity
        BuiltinPermission { codename: ACTIVITY_READ, name: "View Activity", description: "View the activity log", category: "Activity" },
        BuiltinPermission { codename: ACTIVITY_DELETE, name: "Delete Activity", description: "Delete activity log entries", category: "Activity" },

        // Dashboard
        BuiltinPermission { codename: DASHBOARD_READ, name: "View Dashboard", description: "View dashboard statistics", category: "Dashboard" },

        // Account Sharing
        BuiltinPermission { codename: ACCOUNT_SHARES_MANAGE, name: "Share Account", description: "Share own account access with other users", category: "Account Sharing" },

        // Media
        BuiltinPermission { codename: MEDIA_READ, name: "View Media", description: "Receive media library updates", category: "Media" },
        BuiltinPermission { codename: MEDIA_WRITE, name: "Publish Media Changes", description: "Report media and folder changes from the storage service", category: "Media" },

        // Administration
        BuiltinPermission { codename: ADMIN_ACCESS, name: "Admin Area", description: "Access the admin area and its live feed", category: "Administration" },
    ];

    CATALOG
}

/// Permissions granted to the built-in `member` group every new account joins.
pub fn member_permissions() -> &'static [&'static str] {
    use crate::permissions::codes::*;
    &[DASHBOARD_READ, ACCOUNT_SHARES_MANAGE, MEDIA_READ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_codenames_are_unique_and_valid() {
        let mut seen = HashSet::new();
        for builtin in builtin_permissions() {
            assert!(is_valid_codename(builtin.codename), "{}", builtin.codename);
            assert!(seen.insert(builtin.codename), "duplicate {}", builtin.codename);
        }
    }

    #[test]
    fn codename_validation() {
        assert!(is_valid_codename("edit_profile"));
        assert!(is_valid_codename("groups:write"));
        assert!(!is_valid_codename(""));
        assert!(!is_valid_codename("Groups Write"));
    }
}
