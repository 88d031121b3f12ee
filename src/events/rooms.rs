use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::permissions::codes;

/// Named subscription channel. `user:{id}` carries personal events; the
/// topic rooms carry broadcast-style feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Room {
    User(Uuid),
    Admin,
    Dashboard,
    Notifications,
    Media,
    Activity,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown room {0:?}")]
pub struct RoomParseError(pub String);

/// Who may join a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAccess {
    /// Only the user the room belongs to.
    Owner(Uuid),
    /// Anyone holding the permission.
    Permission(&'static str),
}

impl Room {
    pub fn access(&self) -> RoomAccess {
        match self {
            Room::User(id) => RoomAccess::Owner(*id),
            Room::Admin => RoomAccess::Permission(codes::ADMIN_ACCESS),
            Room::Dashboard => RoomAccess::Permission(codes::DASHBOARD_READ),
            Room::Notifications => RoomAccess::Permission(codes::NOTIFICATIONS_MONITOR),
            Room::Media => RoomAccess::Permission(codes::MEDIA_READ),
            Room::Activity => RoomAccess::Permission(codes::ACTIVITY_READ),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{id}"),
            Room::Admin => f.write_str("admin"),
            Room::Dashboard => f.write_str("dashboard"),
            Room::Notifications => f.write_str("notifications"),
            Room::Media => f.write_str("media"),
            Room::Activity => f.write_str("activity"),
        }
    }
}

impl FromStr for Room {
    type Err = RoomParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Room::Admin),
            "dashboard" => Ok(Room::Dashboard),
            "notifications" => Ok(Room::Notifications),
            "media" => Ok(Room::Media),
            "activity" => Ok(Room::Activity),
            other => other
                .strip_prefix("user:")
                .and_then(|id| Uuid::parse_str(id).ok())
                .map(Room::User)
                .ok_or_else(|| RoomParseError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Room {
    type Error = RoomParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Room> for String {
    fn from(room: Room) -> Self {
        room.to_string()
    }
}
