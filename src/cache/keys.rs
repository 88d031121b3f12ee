//! Cache key namespace: `<resource>:<id>`.

use uuid::Uuid;

pub const PERMISSION_SET_PREFIX: &str = "permission-set:";
pub const DASHBOARD_STATS: &str = "dashboard:stats";

pub fn permission_set(user_id: Uuid) -> String {
    format!("{PERMISSION_SET_PREFIX}{user_id}")
}
