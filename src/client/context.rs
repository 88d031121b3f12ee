use std::collections::{BTreeMap, BTreeSet};

use crate::events::{ClientFrame, Room, ServerEvent, ServerFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub type ListenerId = u64;

type Listener = Box<dyn Fn(&Room, &ServerEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    /// `None` listens to every event.
    event: Option<String>,
    callback: Listener,
}

/// Client-side subscription state, free of any I/O.
///
/// The transport reports connection changes and feeds in received text; the
/// context answers with the frames to send. Requested rooms survive
/// reconnects and are re-joined with the last sequence number seen, so the
/// server can replay what was missed. Delivery is at-least-once: listeners
/// must tolerate duplicates and must not call back into the context.
pub struct ClientContext {
    state: ConnectionState,
    /// Requested rooms and the last sequence number received in each.
    rooms: BTreeMap<Room, Option<u64>>,
    /// Joins sent on this connection and not yet answered.
    pending: BTreeSet<Room>,
    joined: BTreeSet<Room>,
    listeners: Vec<Registration>,
    next_listener: ListenerId,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientContext {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            rooms: BTreeMap::new(),
            pending: BTreeSet::new(),
            joined: BTreeSet::new(),
            listeners: Vec::new(),
            next_listener: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn requested_rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.keys()
    }

    pub fn joined_rooms(&self) -> impl Iterator<Item = &Room> {
        self.joined.iter()
    }

    pub fn last_seq(&self, room: &Room) -> Option<u64> {
        self.rooms.get(room).copied().flatten()
    }

    /// Remembers `room` and returns the join frame to send now, if connected.
    pub fn subscribe(&mut self, room: Room) -> Option<ClientFrame> {
        let since = *self.rooms.entry(room).or_insert(None);
        if self.state != ConnectionState::Connected
            || self.joined.contains(&room)
            || !self.pending.insert(room)
        {
            return None;
        }
        Some(ClientFrame::Join { room, since })
    }

    /// Forgets `room`. A leave is sent when the server has joined the room
    /// or may still do so for a join in flight.
    pub fn unsubscribe(&mut self, room: Room) -> Option<ClientFrame> {
        self.rooms.remove(&room)?;
        let was_pending = self.pending.remove(&room);
        let was_joined = self.joined.remove(&room);
        let in_room = was_joined || was_pending;
        (self.state == ConnectionState::Connected && in_room).then_some(ClientFrame::Leave { room })
    }

    fn reset_rooms(&mut self) {
        self.pending.clear();
        self.joined.clear();
    }

    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.reset_rooms();
    }

    /// Marks the socket open and returns a join frame for every requested
    /// room.
    pub fn connected(&mut self) -> Vec<ClientFrame> {
        self.state = ConnectionState::Connected;
        self.reset_rooms();
        self.pending.extend(self.rooms.keys().copied());
        self.rooms
            .iter()
            .map(|(room, since)| ClientFrame::Join {
                room: *room,
                since: *since,
            })
            .collect()
    }

    pub fn disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.reset_rooms();
    }

    /// Registers a callback for one event name, e.g. `notification:new`.
    pub fn on<F>(&mut self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&Room, &ServerEvent) + Send + Sync + 'static,
    {
        self.register(Some(event.into()), Box::new(callback))
    }

    /// Registers a callback for every event.
    pub fn on_any<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&Room, &ServerEvent) + Send + Sync + 'static,
    {
        self.register(None, Box::new(callback))
    }

    fn register(&mut self, event: Option<String>, callback: Listener) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push(Registration { id, event, callback });
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|registration| registration.id != id);
        self.listeners.len() != before
    }

    pub fn handle_text(&mut self, text: &str) -> Result<ServerFrame, serde_json::Error> {
        let frame: ServerFrame = serde_json::from_str(text)?;
        self.handle_frame(&frame);
        Ok(frame)
    }

    pub fn handle_frame(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::Event { room, seq, payload } => {
                // Late frames for a room already given up are dropped.
                let Some(last) = self.rooms.get_mut(room) else {
                    log::debug!(target: "adminhub::client", "ignoring event for unrequested room {room}");
                    return;
                };
                *last = Some(last.map_or(*seq, |prev| prev.max(*seq)));
                self.dispatch(room, payload);
            }
            ServerFrame::Joined { room, replayed } => {
                self.pending.remove(room);
                if self.rooms.contains_key(room) {
                    log::debug!(target: "adminhub::client", "joined {room} ({replayed} replayed)");
                    self.joined.insert(*room);
                }
            }
            ServerFrame::Left { room } => {
                self.pending.remove(room);
                self.joined.remove(room);
            }
            ServerFrame::Error { message, room } => match room {
                Some(room) => {
                    self.pending.remove(room);
                    log::warn!(target: "adminhub::client", "{room}: {message}");
                }
                None => log::warn!(target: "adminhub::client", "{message}"),
            },
            ServerFrame::Pong => {}
        }
    }

    fn dispatch(&self, room: &Room, event: &ServerEvent) {
        let name = event.name();
        for registration in &self.listeners {
            if registration.event.as_deref().map_or(true, |wanted| wanted == name) {
                (registration.callback)(room, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn event(room: Room, seq: u64) -> ServerFrame {
        ServerFrame::Event {
            room,
            seq,
            payload: ServerEvent::ActivityDeleted { id: Uuid::nil() },
        }
    }

    #[test]
    fn subscriptions_wait_for_connection() {
        let mut ctx = ClientContext::new();
        assert_eq!(ctx.subscribe(Room::Dashboard), None);
        assert_eq!(ctx.state(), ConnectionState::Disconnected);

        ctx.connecting();
        let joins = ctx.connected();
        assert_eq!(joins, vec![ClientFrame::Join { room: Room::Dashboard, since: None }]);
        assert_eq!(
            ctx.subscribe(Room::Activity),
            Some(ClientFrame::Join { room: Room::Activity, since: None })
        );
    }

    #[test]
    fn reconnect_rejoins_with_last_seen_sequence() {
        let mut ctx = ClientContext::new();
        ctx.subscribe(Room::Activity);
        ctx.subscribe(Room::Media);
        ctx.connected();
        ctx.handle_frame(&ServerFrame::Joined { room: Room::Activity, replayed: 0 });
        ctx.handle_frame(&event(Room::Activity, 7));
        ctx.handle_frame(&event(Room::Activity, 5));

        ctx.disconnected();
        assert_eq!(ctx.joined_rooms().count(), 0);

        let joins = ctx.connected();
        assert!(joins.contains(&ClientFrame::Join { room: Room::Activity, since: Some(7) }));
        assert!(joins.contains(&ClientFrame::Join { room: Room::Media, since: None }));
    }

    #[test]
    fn listeners_filter_by_name_and_can_be_removed() {
        let mut ctx = ClientContext::new();
        ctx.subscribe(Room::Activity);
        let named = Arc::new(AtomicUsize::new(0));
        let any = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&named);
        let id = ctx.on("activity:deleted", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&any);
        ctx.on_any(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ctx.on("notification:new", |_, _| panic!("wrong event"));

        ctx.handle_frame(&event(Room::Activity, 1));
        assert!(ctx.off(id));
        assert!(!ctx.off(id));
        ctx.handle_frame(&event(Room::Activity, 2));

        assert_eq!(named.load(Ordering::SeqCst), 1);
        assert_eq!(any.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_leaves_joined_rooms() {
        let mut ctx = ClientContext::new();
        assert_eq!(ctx.unsubscribe(Room::Admin), None);

        ctx.subscribe(Room::Admin);
        assert_eq!(ctx.unsubscribe(Room::Admin), None, "never sent while offline");

        ctx.connected();
        ctx.subscribe(Room::Admin);
        ctx.handle_frame(&ServerFrame::Joined { room: Room::Admin, replayed: 0 });
        assert_eq!(ctx.unsubscribe(Room::Admin), Some(ClientFrame::Leave { room: Room::Admin }));
        assert_eq!(ctx.requested_rooms().count(), 0);
    }

    #[test]
    fn unsubscribe_during_a_join_in_flight_still_leaves() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut ctx = ClientContext::new();
        let counter = Arc::clone(&seen);
        ctx.on_any(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ctx.connected();
        assert!(ctx.subscribe(Room::Activity).is_some());

        // The join is on the wire but unanswered.
        assert_eq!(ctx.unsubscribe(Room::Activity), Some(ClientFrame::Leave { room: Room::Activity }));

        ctx.handle_frame(&ServerFrame::Joined { room: Room::Activity, replayed: 0 });
        ctx.handle_frame(&event(Room::Activity, 3));
        assert_eq!(ctx.joined_rooms().count(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refused_join_is_not_pending() {
        let mut ctx = ClientContext::new();
        ctx.subscribe(Room::Admin);
        ctx.connected();
        ctx.handle_frame(&ServerFrame::Error {
            message: "forbidden".into(),
            room: Some(Room::Admin),
        });
        assert_eq!(ctx.unsubscribe(Room::Admin), None);
    }

    #[test]
    fn malformed_text_is_an_error() {
        let mut ctx = ClientContext::new();
        assert!(ctx.handle_text("{\"type\":\"nope\"}").is_err());
        assert!(matches!(ctx.handle_text("{\"type\":\"pong\"}"), Ok(ServerFrame::Pong)));
    }
}
