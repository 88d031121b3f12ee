use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const ACCESS_LEVELS: &[&str] = &["view", "manage"];

/// Grant from `owner_id` letting `shared_with_id` access the owner's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AccountShare {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub shared_with_id: Uuid,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccountShare {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.shared_with_id == user_id
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountShare {
    /// Recipient, identified by email.
    pub email: String,
    #[serde(default = "default_access_level")]
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAccountShare {
    pub owner_id: Uuid,
    pub shared_with_id: Uuid,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountShareList {
    pub owned: Vec<AccountShare>,
    pub received: Vec<AccountShare>,
}

fn default_access_level() -> String {
    "view".to_string()
}
