use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Room, ServerEvent, ServerFrame};

pub type ConnectionId = u64;

/// Outbound text frames for one socket, already serialized.
pub type Outbound = mpsc::UnboundedReceiver<Arc<str>>;

/// The authenticated session a socket was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Registry of live sockets and the rooms they joined.
///
/// Every published event gets the next hub-wide sequence number and is kept
/// in a bounded per-room history, so a client that reconnects can ask for
/// everything after the last number it saw.
pub struct RoomHub {
    inner: Mutex<HubState>,
    next_connection: AtomicU64,
    history_limit: usize,
}

#[derive(Default)]
struct HubState {
    seq: u64,
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<Room, RoomState>,
}

struct Connection {
    sender: mpsc::UnboundedSender<Arc<str>>,
    peer: Peer,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct RoomState {
    members: HashSet<ConnectionId>,
    history: VecDeque<(u64, Arc<str>)>,
}

impl RoomState {
    fn is_idle(&self) -> bool {
        self.members.is_empty() && self.history.is_empty()
    }
}

impl HubState {
    fn remove_member(&mut self, room: Room, id: ConnectionId) {
        if let Some(existing) = self.rooms.get_mut(&room) {
            existing.members.remove(&id);
            if existing.is_idle() {
                self.rooms.remove(&room);
            }
        }
    }

    fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        for room in &connection.rooms {
            self.remove_member(*room, id);
        }
        Some(connection)
    }
}

impl RoomHub {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(HubState::default()),
            next_connection: AtomicU64::new(1),
            history_limit,
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a socket and returns the receiving end of its outbound queue.
    pub fn connect(&self, peer: Peer) -> (ConnectionId, Outbound) {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state().connections.insert(
            id,
            Connection {
                sender,
                peer,
                rooms: HashSet::new(),
            },
        );
        log::debug!(target: "adminhub::ws", "connection {id} registered for user {}", peer.user_id);
        (id, receiver)
    }

    /// Adds the connection to `room`, queues a `joined` frame and then
    /// replays buffered events newer than `since`. Returns how many were
    /// replayed, or `None` for an unknown connection.
    pub fn join(&self, id: ConnectionId, room: Room, since: Option<u64>) -> Option<usize> {
        let mut state = self.state();
        let backlog: Vec<Arc<str>> = match (since, state.rooms.get(&room)) {
            (Some(since), Some(existing)) => existing
                .history
                .iter()
                .filter(|(seq, _)| *seq > since)
                .map(|(_, text)| Arc::clone(text))
                .collect(),
            _ => Vec::new(),
        };

        let connection = state.connections.get_mut(&id)?;
        connection.rooms.insert(room);
        let sender = connection.sender.clone();
        state.rooms.entry(room).or_default().members.insert(id);
        drop(state);

        let joined = ServerFrame::Joined {
            room,
            replayed: backlog.len(),
        };
        send_frame(&sender, &joined);
        for text in &backlog {
            let _ = sender.send(Arc::clone(text));
        }
        Some(backlog.len())
    }

    /// Returns whether the connection was in the room.
    pub fn leave(&self, id: ConnectionId, room: Room) -> bool {
        self.remove_from_room(id, room, None)
    }

    /// Removes the connection from `room` after telling it why, e.g. when the
    /// permission the room needs was revoked.
    pub fn evict(&self, id: ConnectionId, room: Room, reason: &str) -> bool {
        self.remove_from_room(id, room, Some(reason))
    }

    fn remove_from_room(&self, id: ConnectionId, room: Room, reason: Option<&str>) -> bool {
        let mut state = self.state();
        let Some(connection) = state.connections.get_mut(&id) else {
            return false;
        };
        if !connection.rooms.remove(&room) {
            return false;
        }
        let sender = connection.sender.clone();
        state.remove_member(room, id);
        drop(state);

        if let Some(reason) = reason {
            send_frame(
                &sender,
                &ServerFrame::Error {
                    message: reason.to_string(),
                    room: Some(room),
                },
            );
        }
        send_frame(&sender, &ServerFrame::Left { room });
        true
    }

    pub fn disconnect(&self, id: ConnectionId) {
        if self.state().remove_connection(id).is_some() {
            log::debug!(target: "adminhub::ws", "connection {id} removed");
        }
    }

    /// Drops every connection whose peer matches, after queuing an error
    /// frame. Dropping the queue ends the socket task. Returns how many
    /// were closed.
    pub fn close_where(&self, reason: &str, matches: impl Fn(&Peer) -> bool) -> usize {
        let mut state = self.state();
        let doomed: Vec<ConnectionId> = state
            .connections
            .iter()
            .filter(|(_, connection)| matches(&connection.peer))
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            if let Some(connection) = state.remove_connection(*id) {
                send_frame(
                    &connection.sender,
                    &ServerFrame::Error {
                        message: reason.to_string(),
                        room: None,
                    },
                );
            }
        }
        if !doomed.is_empty() {
            log::info!(target: "adminhub::ws", "closed {} connection(s): {reason}", doomed.len());
        }
        doomed.len()
    }

    pub fn close_user(&self, user_id: Uuid, reason: &str) -> usize {
        self.close_where(reason, |peer| peer.user_id == user_id)
    }

    pub fn close_session(&self, session_id: Uuid, reason: &str) -> usize {
        self.close_where(reason, |peer| peer.session_id == session_id)
    }

    /// Forgets a room entirely, members and history. Used for the personal
    /// room of a deleted user.
    pub fn drop_room(&self, room: Room) {
        let mut state = self.state();
        let HubState {
            connections, rooms, ..
        } = &mut *state;
        if let Some(existing) = rooms.remove(&room) {
            for member in existing.members {
                if let Some(connection) = connections.get_mut(&member) {
                    connection.rooms.remove(&room);
                }
            }
        }
    }

    /// Queues a frame for a single connection.
    pub fn send_to(&self, id: ConnectionId, frame: &ServerFrame) -> bool {
        let sender = match self.state().connections.get(&id) {
            Some(connection) => connection.sender.clone(),
            None => return false,
        };
        send_frame(&sender, frame)
    }

    /// Fans `event` out to every member of `room`. Returns the sequence
    /// number assigned and the number of sockets it was queued for.
    pub fn publish(&self, room: Room, event: &ServerEvent) -> Result<(u64, usize), serde_json::Error> {
        let mut state = self.state();
        let seq = state.seq + 1;
        let frame = ServerFrame::Event {
            room,
            seq,
            payload: event.clone(),
        };
        let text: Arc<str> = serde_json::to_string(&frame)?.into();
        state.seq = seq;

        let HubState {
            connections, rooms, ..
        } = &mut *state;
        let entry = rooms.entry(room).or_default();
        if self.history_limit > 0 {
            entry.history.push_back((seq, Arc::clone(&text)));
            while entry.history.len() > self.history_limit {
                entry.history.pop_front();
            }
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for member in &entry.members {
            match connections.get(member) {
                Some(connection) if connection.sender.send(Arc::clone(&text)).is_ok() => {
                    delivered += 1
                }
                _ => dead.push(*member),
            }
        }
        for member in dead {
            entry.members.remove(&member);
            connections.remove(&member);
        }
        if entry.is_idle() {
            rooms.remove(&room);
        }
        Ok((seq, delivered))
    }

    /// Connections opened by `user_id`, with the rooms each has joined.
    pub fn connections_of(&self, user_id: Uuid) -> Vec<(ConnectionId, Vec<Room>)> {
        let state = self.state();
        let mut found: Vec<(ConnectionId, Vec<Room>)> = state
            .connections
            .iter()
            .filter(|(_, connection)| connection.peer.user_id == user_id)
            .map(|(id, connection)| {
                let mut rooms: Vec<Room> = connection.rooms.iter().copied().collect();
                rooms.sort();
                (*id, rooms)
            })
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found
    }

    /// Distinct users with at least one open socket.
    pub fn connected_users(&self) -> Vec<Uuid> {
        let users: HashSet<Uuid> = self
            .state()
            .connections
            .values()
            .map(|connection| connection.peer.user_id)
            .collect();
        let mut users: Vec<Uuid> = users.into_iter().collect();
        users.sort();
        users
    }

    pub fn room_size(&self, room: Room) -> usize {
        self.state()
            .rooms
            .get(&room)
            .map(|existing| existing.members.len())
            .unwrap_or(0)
    }

    /// Rooms currently tracked, with members or replay history.
    pub fn room_count(&self) -> usize {
        self.state().rooms.len()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .state()
            .connections
            .get(&id)
            .map(|connection| connection.rooms.iter().copied().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }
}

fn send_frame(sender: &mpsc::UnboundedSender<Arc<str>>, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(text) => sender.send(text.into()).is_ok(),
        Err(err) => {
            log::error!(target: "adminhub::ws", "failed to encode frame: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> ServerFrame {
        serde_json::from_str(text).unwrap()
    }

    fn drain(rx: &mut Outbound) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(text) = rx.try_recv() {
            frames.push(decode(&text));
        }
        frames
    }

    fn peer() -> Peer {
        Peer {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        }
    }

    fn deleted(id: Uuid) -> ServerEvent {
        ServerEvent::ActivityDeleted { id }
    }

    #[test]
    fn only_members_receive_room_events() {
        let hub = RoomHub::new(10);
        let (a, mut rx_a) = hub.connect(peer());
        let (_b, mut rx_b) = hub.connect(peer());
        hub.join(a, Room::Activity, None);
        drain(&mut rx_a);

        let (seq, delivered) = hub.publish(Room::Activity, &deleted(Uuid::nil())).unwrap();
        assert_eq!((seq, delivered), (1, 1));

        let frames = drain(&mut rx_a);
        assert!(matches!(frames.as_slice(), [ServerFrame::Event { seq: 1, room: Room::Activity, .. }]));
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn rejoin_replays_only_newer_events() {
        let hub = RoomHub::new(10);
        for _ in 0..3 {
            hub.publish(Room::Dashboard, &deleted(Uuid::nil())).unwrap();
        }
        let (id, mut rx) = hub.connect(peer());
        assert_eq!(hub.join(id, Room::Dashboard, Some(1)), Some(2));

        let frames = drain(&mut rx);
        assert_eq!(frames[0], ServerFrame::Joined { room: Room::Dashboard, replayed: 2 });
        let seqs: Vec<u64> = frames[1..]
            .iter()
            .filter_map(|frame| match frame {
                ServerFrame::Event { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn fresh_join_does_not_replay() {
        let hub = RoomHub::new(10);
        hub.publish(Room::Media, &deleted(Uuid::nil())).unwrap();
        let (id, mut rx) = hub.connect(peer());
        assert_eq!(hub.join(id, Room::Media, None), Some(0));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let hub = RoomHub::new(2);
        for _ in 0..5 {
            hub.publish(Room::Activity, &deleted(Uuid::nil())).unwrap();
        }
        let (id, _rx) = hub.connect(peer());
        assert_eq!(hub.join(id, Room::Activity, Some(0)), Some(2));
    }

    #[test]
    fn leave_and_disconnect_stop_delivery() {
        let hub = RoomHub::new(10);
        let (id, mut rx) = hub.connect(peer());
        let user_room = Room::User(Uuid::new_v4());
        hub.join(id, user_room, None);
        hub.join(id, Room::Admin, None);

        assert!(hub.leave(id, user_room));
        assert!(!hub.leave(id, user_room));
        assert_eq!(hub.rooms_of(id), vec![Room::Admin]);
        drain(&mut rx);

        assert_eq!(hub.publish(user_room, &deleted(Uuid::nil())).unwrap().1, 0);
        hub.disconnect(id);
        assert_eq!(hub.room_size(Room::Admin), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let hub = RoomHub::new(10);
        let (id, rx) = hub.connect(peer());
        hub.join(id, Room::Notifications, None);
        drop(rx);

        assert_eq!(hub.publish(Room::Notifications, &deleted(Uuid::nil())).unwrap().1, 0);
        assert_eq!(hub.room_size(Room::Notifications), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn unknown_connection_cannot_join() {
        let hub = RoomHub::new(10);
        assert_eq!(hub.join(42, Room::Admin, None), None);
        assert_eq!(hub.room_size(Room::Admin), 0);
    }

    #[test]
    fn evicted_connection_is_told_and_stops_receiving() {
        let hub = RoomHub::new(10);
        let (id, mut rx) = hub.connect(peer());
        hub.join(id, Room::Activity, None);
        drain(&mut rx);

        assert!(hub.evict(id, Room::Activity, "access revoked"));
        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![
                ServerFrame::Error {
                    message: "access revoked".into(),
                    room: Some(Room::Activity)
                },
                ServerFrame::Left { room: Room::Activity },
            ]
        );
        assert_eq!(hub.publish(Room::Activity, &deleted(Uuid::nil())).unwrap().1, 0);
        assert!(!hub.evict(id, Room::Activity, "again"));
    }

    #[test]
    fn closing_a_user_drops_only_their_sockets() {
        let hub = RoomHub::new(10);
        let alice = peer();
        let (first, mut rx_first) = hub.connect(alice);
        let (second, mut rx_second) = hub.connect(Peer {
            session_id: Uuid::new_v4(),
            ..alice
        });
        let (other, _rx_other) = hub.connect(peer());
        hub.join(first, Room::Admin, None);
        hub.join(other, Room::Admin, None);
        drain(&mut rx_first);

        assert_eq!(hub.connections_of(alice.user_id).len(), 2);
        assert_eq!(hub.close_user(alice.user_id, "account locked"), 2);
        assert_eq!(hub.connections_of(alice.user_id), Vec::new());
        assert_eq!(hub.room_size(Room::Admin), 1);
        assert_eq!(hub.connection_count(), 1);

        // The reason is delivered, then the queue ends.
        assert!(matches!(drain(&mut rx_first).as_slice(), [ServerFrame::Error { room: None, .. }]));
        assert!(rx_first.try_recv().is_err());
        assert!(rx_second.try_recv().is_ok());
        assert!(hub.send_to(other, &ServerFrame::Pong));
        assert!(!hub.send_to(second, &ServerFrame::Pong));
    }

    #[test]
    fn closing_a_session_spares_other_sessions() {
        let hub = RoomHub::new(10);
        let alice = peer();
        let (_kept, _rx_kept) = hub.connect(alice);
        let other_session = Peer {
            session_id: Uuid::new_v4(),
            ..alice
        };
        let (_closed, _rx_closed) = hub.connect(other_session);

        assert_eq!(hub.close_session(other_session.session_id, "logged out"), 1);
        assert_eq!(hub.connected_users(), vec![alice.user_id]);
    }

    #[test]
    fn idle_rooms_are_forgotten() {
        let hub = RoomHub::new(0);
        let (id, _rx) = hub.connect(peer());
        let user_room = Room::User(Uuid::new_v4());

        hub.publish(user_room, &deleted(Uuid::nil())).unwrap();
        assert_eq!(hub.room_count(), 0);

        hub.join(id, user_room, None);
        assert_eq!(hub.room_count(), 1);
        hub.leave(id, user_room);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn dropped_room_loses_members_and_history() {
        let hub = RoomHub::new(10);
        let (id, _rx) = hub.connect(peer());
        let user_room = Room::User(Uuid::new_v4());
        hub.join(id, user_room, None);
        hub.publish(user_room, &deleted(Uuid::nil())).unwrap();

        hub.drop_room(user_room);
        assert_eq!(hub.room_count(), 0);
        assert!(hub.rooms_of(id).is_empty());
        assert_eq!(hub.join(id, user_room, Some(0)), Some(0));
    }
}
