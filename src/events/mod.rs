//! Realtime fan-out: typed events, rooms, and the hub sockets subscribe to.

mod emitter;
mod event;
mod hub;
mod rooms;

pub use emitter::EventEmitter;
pub use event::{ClientFrame, ServerEvent, ServerFrame};
pub use hub::{ConnectionId, Outbound, Peer, RoomHub};
pub use rooms::{Room, RoomAccess, RoomParseError};
