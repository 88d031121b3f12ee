use std::sync::Arc;

use uuid::Uuid;

use super::{Room, RoomHub, ServerEvent};
use crate::models::{
    AccountShare, ActivityEntry, DashboardStats, Group, MediaFolder, MediaItem, Notification, User,
};

/// Typed front door to the [`RoomHub`]. Each method knows which rooms its
/// event belongs to. Emission never fails the caller: problems are logged
/// and dropped.
#[derive(Clone)]
pub struct EventEmitter {
    hub: Arc<RoomHub>,
}

impl EventEmitter {
    pub fn new(hub: Arc<RoomHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    fn emit(&self, rooms: &[Room], event: ServerEvent) {
        for room in rooms {
            match self.hub.publish(*room, &event) {
                Ok((seq, delivered)) => log::debug!(
                    target: "adminhub::events",
                    "{} -> {room} (seq {seq}, {delivered} sockets)",
                    event.name()
                ),
                Err(err) => log::error!(
                    target: "adminhub::events",
                    "failed to emit {} to {room}: {err}",
                    event.name()
                ),
            }
        }
    }

    pub fn user_created(&self, user: &User) {
        self.emit(&[Room::Admin], ServerEvent::UserCreated(user.into()));
    }

    pub fn user_updated(&self, user: &User) {
        self.emit(
            &[Room::Admin, Room::User(user.id)],
            ServerEvent::UserUpdated(user.into()),
        );
    }

    pub fn user_deleted(&self, user_id: Uuid) {
        self.emit(
            &[Room::Admin, Room::User(user_id)],
            ServerEvent::UserDeleted { id: user_id },
        );
        // The personal room's history is of no use once the account is gone.
        self.hub.drop_room(Room::User(user_id));
    }

    pub fn notification_new(&self, notification: &Notification) {
        self.emit(
            &[Room::User(notification.user_id), Room::Notifications],
            ServerEvent::NotificationNew(notification.clone()),
        );
    }

    pub fn notification_updated(&self, notification: &Notification) {
        self.emit(
            &[Room::User(notification.user_id), Room::Notifications],
            ServerEvent::NotificationUpdated(notification.clone()),
        );
    }

    pub fn notification_deleted(&self, id: Uuid, user_id: Uuid) {
        self.emit(
            &[Room::User(user_id), Room::Notifications],
            ServerEvent::NotificationDeleted { id, user_id },
        );
    }

    pub fn dashboard_stats(&self, stats: &DashboardStats) {
        self.emit(&[Room::Dashboard], ServerEvent::DashboardStatsUpdate(stats.clone()));
    }

    pub fn activity_new(&self, entry: &ActivityEntry) {
        self.emit(&[Room::Activity], ServerEvent::ActivityNew(entry.clone()));
    }

    pub fn activity_deleted(&self, id: Uuid) {
        self.emit(&[Room::Activity], ServerEvent::ActivityDeleted { id });
    }

    /// Tells each user to refetch their permission set.
    pub fn permissions_changed(&self, user_ids: &[Uuid]) {
        for user_id in user_ids {
            self.emit(
                &[Room::User(*user_id)],
                ServerEvent::PermissionsChanged { user_id: *user_id },
            );
        }
    }

    pub fn group_created(&self, group: &Group) {
        self.emit(&[Room::Admin], ServerEvent::GroupCreated(group.clone()));
    }

    pub fn group_updated(&self, group: &Group) {
        self.emit(&[Room::Admin], ServerEvent::GroupUpdated(group.clone()));
    }

    pub fn group_deleted(&self, id: Uuid) {
        self.emit(&[Room::Admin], ServerEvent::GroupDeleted { id });
    }

    pub fn account_share_created(&self, share: &AccountShare) {
        self.emit(
            &share_rooms(share),
            ServerEvent::AccountShareCreated(share.clone()),
        );
    }

    pub fn account_share_revoked(&self, share: &AccountShare) {
        self.emit(
            &share_rooms(share),
            ServerEvent::AccountShareRevoked(share.clone()),
        );
    }

    pub fn media_created(&self, item: &MediaItem) {
        self.emit(&[Room::Media], ServerEvent::MediaCreated(item.clone()));
    }

    pub fn media_updated(&self, item: &MediaItem) {
        self.emit(&[Room::Media], ServerEvent::MediaUpdated(item.clone()));
    }

    pub fn media_deleted(&self, id: Uuid) {
        self.emit(&[Room::Media], ServerEvent::MediaDeleted { id });
    }

    pub fn folder_created(&self, folder: &MediaFolder) {
        self.emit(&[Room::Media], ServerEvent::FolderCreated(folder.clone()));
    }

    pub fn folder_updated(&self, folder: &MediaFolder) {
        self.emit(&[Room::Media], ServerEvent::FolderUpdated(folder.clone()));
    }

    pub fn folder_deleted(&self, id: Uuid) {
        self.emit(&[Room::Media], ServerEvent::FolderDeleted { id });
    }
}

fn share_rooms(share: &AccountShare) -> [Room; 2] {
    [Room::User(share.owner_id), Room::User(share.shared_with_id)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Outbound, Peer, ServerFrame};
    use chrono::Utc;

    fn next_event(rx: &mut Outbound) -> Option<(Room, ServerEvent)> {
        while let Ok(text) = rx.try_recv() {
            if let ServerFrame::Event { room, payload, .. } = serde_json::from_str(&text).unwrap() {
                return Some((room, payload));
            }
        }
        None
    }

    fn notification(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            title: "Report ready".into(),
            message: "Your export finished".into(),
            kind: "success".into(),
            link: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    fn peer(user_id: Uuid) -> Peer {
        Peer {
            user_id,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn notification_reaches_recipient_and_monitors_only() {
        let hub = Arc::new(RoomHub::new(16));
        let emitter = EventEmitter::new(Arc::clone(&hub));
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (bob_conn, mut bob_rx) = hub.connect(peer(bob));
        hub.join(bob_conn, Room::User(bob), None);
        let (alice_conn, mut alice_rx) = hub.connect(peer(alice));
        hub.join(alice_conn, Room::User(alice), None);
        let (monitor, mut monitor_rx) = hub.connect(peer(Uuid::new_v4()));
        hub.join(monitor, Room::Notifications, None);

        let sent = notification(bob);
        emitter.notification_new(&sent);

        let (room, event) = next_event(&mut bob_rx).unwrap();
        assert_eq!(room, Room::User(bob));
        assert_eq!(event, ServerEvent::NotificationNew(sent.clone()));
        assert!(next_event(&mut alice_rx).is_none());
        assert_eq!(next_event(&mut monitor_rx).unwrap().0, Room::Notifications);
    }

    #[test]
    fn permissions_changed_targets_each_user_room() {
        let hub = Arc::new(RoomHub::new(16));
        let emitter = EventEmitter::new(Arc::clone(&hub));
        let users = [Uuid::new_v4(), Uuid::new_v4()];
        let mut receivers = Vec::new();
        for user in users {
            let (conn, rx) = hub.connect(peer(user));
            hub.join(conn, Room::User(user), None);
            receivers.push(rx);
        }

        emitter.permissions_changed(&users);
        for (user, rx) in users.iter().zip(receivers.iter_mut()) {
            let (_, event) = next_event(rx).unwrap();
            assert_eq!(event, ServerEvent::PermissionsChanged { user_id: *user });
        }
    }

    #[test]
    fn emitting_without_listeners_is_harmless() {
        let emitter = EventEmitter::new(Arc::new(RoomHub::new(0)));
        emitter.group_deleted(Uuid::new_v4());
        emitter.media_deleted(Uuid::new_v4());
    }

    #[test]
    fn deleting_a_user_forgets_their_room() {
        let hub = Arc::new(RoomHub::new(16));
        let emitter = EventEmitter::new(Arc::clone(&hub));
        let gone = Uuid::new_v4();
        let (conn, mut rx) = hub.connect(peer(gone));
        hub.join(conn, Room::User(gone), None);

        emitter.user_deleted(gone);
        let (room, event) = next_event(&mut rx).unwrap();
        assert_eq!(room, Room::User(gone));
        assert_eq!(event, ServerEvent::UserDeleted { id: gone });
        assert!(hub.rooms_of(conn).is_empty());
        // Only the admin room keeps history.
        assert_eq!(hub.room_count(), 1);
    }
}
