pub mod auth;
pub mod permission;

pub use auth::{authenticate, AuthUser, Credential};
pub use permission::{check_permission_or_error, resolve_permissions};
