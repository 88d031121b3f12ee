//! Effective-permission evaluation shared by route guards, the WebSocket
//! room gate and the client-side [`PermissionGate`](crate::client::PermissionGate).

pub mod codes;
mod resolver;
mod set;

pub use resolver::PermissionResolver;
pub use set::{PermissionSet, Requirement};
