//! Built-in permission codenames checked by the API.

pub const USERS_READ: &str = "users:read";
pub const USERS_WRITE: &str = "users:write";
pub const USERS_DELETE: &str = "users:delete";

pub const GROUPS_READ: &str = "groups:read";
pub const GROUPS_WRITE: &str = "groups:write";
pub const GROUPS_DELETE: &str = "groups:delete";

pub const PERMISSIONS_READ: &str = "permissions:read";
pub const PERMISSIONS_WRITE: &str = "permissions:write";
pub const PERMISSIONS_DELETE: &str = "permissions:delete";

pub const NOTIFICATIONS_CREATE: &str = "notifications:create";
pub const NOTIFICATIONS_MONITOR: &str = "notifications:monitor";

pub const ACTIVITY_READ: &str = "activity:read";
pub const ACTIVITY_DELETE: &str = "activity:delete";

pub const DASHBOARD_READ: &str = "dashboard:read";
pub const ACCOUNT_SHARES_MANAGE: &str = "account_shares:manage";
pub const MEDIA_READ: &str = "media:read";
pub const MEDIA_WRITE: &str = "media:write";
pub const ADMIN_ACCESS: &str = "admin:access";
