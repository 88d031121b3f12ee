//! Consumer side of the realtime channel: subscription bookkeeping, a
//! reconnecting socket task, and a permission gate kept fresh by
//! `permissions:changed` events.

mod api;
mod context;
mod gate;
mod transport;

pub use api::{ApiClient, ClientError, LoginSession, Me};
pub use context::{ClientContext, ConnectionState, ListenerId};
pub use gate::{PermissionGate, SharedGate};
pub use transport::{spawn, ClientHandle, Command, ReconnectPolicy};
