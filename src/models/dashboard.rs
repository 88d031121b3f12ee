use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub locked_users: i64,
    pub total_groups: i64,
    pub total_permissions: i64,
    pub unread_notifications: i64,
    pub activity_last_24h: i64,
    pub generated_at: DateTime<Utc>,
}
