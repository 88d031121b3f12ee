//! Repository-style access to the relational data.
//!
//! Handlers and the permission resolver only ever see [`Store`]; the schema
//! behind it is an implementation detail of [`PgStore`] or [`MemoryStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AccountShare, ActivityEntry, ActivityFilter, CreatePermission, DashboardStats, Group,
    NewAccountShare, NewActivity, NewGroup, NewNotification, NewUser, Notification,
    NotificationQuery, Permission, Session, UpdateGroup, UpdatePermission, User, UserChanges,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: Uuid) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<User>;
    /// Removes the user together with memberships, sessions, notifications
    /// and account shares.
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    // Sessions
    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<Session>;
    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> StoreResult<()>;

    // Permissions
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn get_permission(&self, id: Uuid) -> StoreResult<Permission>;
    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>>;
    async fn create_permission(&self, new: CreatePermission) -> StoreResult<Permission>;
    async fn update_permission(&self, id: Uuid, changes: UpdatePermission) -> StoreResult<Permission>;
    /// Deletes the permission and every group assignment referencing it.
    async fn delete_permission(&self, id: Uuid) -> StoreResult<()>;

    // Groups
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;
    async fn get_group(&self, id: Uuid) -> StoreResult<Group>;
    async fn find_group_by_codename(&self, codename: &str) -> StoreResult<Option<Group>>;
    async fn create_group(&self, new: NewGroup) -> StoreResult<Group>;
    async fn update_group(&self, id: Uuid, changes: UpdateGroup) -> StoreResult<Group>;
    async fn delete_group(&self, id: Uuid) -> StoreResult<()>;
    async fn group_permissions(&self, group_id: Uuid) -> StoreResult<Vec<Permission>>;
    /// Replaces the group's permission assignment.
    async fn set_group_permissions(&self, group_id: Uuid, permission_ids: &[Uuid]) -> StoreResult<()>;
    async fn group_member_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>>;
    /// Returns `false` when the user already was a member.
    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool>;
    /// Returns `false` when the user was not a member.
    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool>;
    async fn user_groups(&self, user_id: Uuid) -> StoreResult<Vec<Group>>;
    async fn set_user_groups(&self, user_id: Uuid, group_ids: &[Uuid]) -> StoreResult<()>;
    /// Members of any group, active or not, that holds the permission.
    async fn users_with_permission(&self, permission_id: Uuid) -> StoreResult<Vec<Uuid>>;
    /// Distinct permission codenames across the user's active groups.
    async fn effective_permissions(&self, user_id: Uuid) -> StoreResult<Vec<String>>;

    // Notifications
    async fn create_notification(&self, new: NewNotification) -> StoreResult<Notification>;
    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification>;
    async fn list_notifications(&self, user_id: Uuid, query: NotificationQuery) -> StoreResult<Vec<Notification>>;
    /// Sets `read_at` unless it is already set.
    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Notification>;
    /// Returns only the notifications that changed state.
    async fn mark_all_notifications_read(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<Notification>>;
    async fn delete_notification(&self, id: Uuid) -> StoreResult<()>;
    async fn unread_notification_count(&self, user_id: Uuid) -> StoreResult<i64>;

    // Activity log
    async fn append_activity(&self, new: NewActivity) -> StoreResult<ActivityEntry>;
    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityEntry>>;
    async fn get_activity(&self, id: Uuid) -> StoreResult<ActivityEntry>;
    async fn delete_activity(&self, id: Uuid) -> StoreResult<()>;

    // Account shares
    async fn create_share(&self, new: NewAccountShare) -> StoreResult<AccountShare>;
    async fn get_share(&self, id: Uuid) -> StoreResult<AccountShare>;
    async fn shares_owned_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>>;
    async fn shares_received_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>>;
    async fn delete_share(&self, id: Uuid) -> StoreResult<()>;

    // Dashboard
    async fn dashboard_stats(&self) -> StoreResult<DashboardStats>;
}

/// Opaque session token handed out through `X-Session-Token`.
pub(crate) fn new_session_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
