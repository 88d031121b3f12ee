use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Room;
use crate::models::{
    AccountShare, ActivityEntry, DashboardStats, Group, MediaFolder, MediaItem, Notification,
    UserResponse,
};

/// Every event the server pushes, tagged by its wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "user:created")]
    UserCreated(UserResponse),
    #[serde(rename = "user:updated")]
    UserUpdated(UserResponse),
    #[serde(rename = "user:deleted")]
    UserDeleted { id: Uuid },

    #[serde(rename = "notification:new")]
    NotificationNew(Notification),
    #[serde(rename = "notification:updated")]
    NotificationUpdated(Notification),
    #[serde(rename = "notification:deleted")]
    NotificationDeleted { id: Uuid, user_id: Uuid },

    #[serde(rename = "dashboard:stats:update")]
    DashboardStatsUpdate(DashboardStats),

    #[serde(rename = "activity:new")]
    ActivityNew(ActivityEntry),
    #[serde(rename = "activity:deleted")]
    ActivityDeleted { id: Uuid },

    /// The user's effective permission set changed; clients refetch it.
    #[serde(rename = "permissions:changed")]
    PermissionsChanged { user_id: Uuid },

    #[serde(rename = "group:created")]
    GroupCreated(Group),
    #[serde(rename = "group:updated")]
    GroupUpdated(Group),
    #[serde(rename = "group:deleted")]
    GroupDeleted { id: Uuid },

    #[serde(rename = "account_share:created")]
    AccountShareCreated(AccountShare),
    #[serde(rename = "account_share:revoked")]
    AccountShareRevoked(AccountShare),

    #[serde(rename = "media:created")]
    MediaCreated(MediaItem),
    #[serde(rename = "media:updated")]
    MediaUpdated(MediaItem),
    #[serde(rename = "media:deleted")]
    MediaDeleted { id: Uuid },

    #[serde(rename = "folder:created")]
    FolderCreated(MediaFolder),
    #[serde(rename = "folder:updated")]
    FolderUpdated(MediaFolder),
    #[serde(rename = "folder:deleted")]
    FolderDeleted { id: Uuid },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserCreated(_) => "user:created",
            ServerEvent::UserUpdated(_) => "user:updated",
            ServerEvent::UserDeleted { .. } => "user:deleted",
            ServerEvent::NotificationNew(_) => "notification:new",
            ServerEvent::NotificationUpdated(_) => "notification:updated",
            ServerEvent::NotificationDeleted { .. } => "notification:deleted",
            ServerEvent::DashboardStatsUpdate(_) => "dashboard:stats:update",
            ServerEvent::ActivityNew(_) => "activity:new",
            ServerEvent::ActivityDeleted { .. } => "activity:deleted",
            ServerEvent::PermissionsChanged { .. } => "permissions:changed",
            ServerEvent::GroupCreated(_) => "group:created",
            ServerEvent::GroupUpdated(_) => "group:updated",
            ServerEvent::GroupDeleted { .. } => "group:deleted",
            ServerEvent::AccountShareCreated(_) => "account_share:created",
            ServerEvent::AccountShareRevoked(_) => "account_share:revoked",
            ServerEvent::MediaCreated(_) => "media:created",
            ServerEvent::MediaUpdated(_) => "media:updated",
            ServerEvent::MediaDeleted { .. } => "media:deleted",
            ServerEvent::FolderCreated(_) => "folder:created",
            ServerEvent::FolderUpdated(_) => "folder:updated",
            ServerEvent::FolderDeleted { .. } => "folder:deleted",
        }
    }
}

/// Frames the server writes to a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Event {
        room: Room,
        /// Hub-wide sequence number; strictly increasing per room.
        seq: u64,
        payload: ServerEvent,
    },
    Joined {
        room: Room,
        replayed: usize,
    },
    Left {
        room: Room,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<Room>,
    },
    Pong,
}

/// Frames a client writes to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        room: Room,
        /// Last sequence number seen in this room; newer buffered events are
        /// replayed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<u64>,
    },
    Leave {
        room: Room,
    },
    Ping,
}
