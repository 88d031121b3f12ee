use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use super::{ClientContext, ListenerId};
use crate::events::ServerEvent;
use crate::permissions::{PermissionSet, Requirement};

/// Client-side mirror of the signed-in user's permission set, for deciding
/// what to show. The server re-checks every request, so a stale gate can
/// only hide or show UI, never grant access.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    user_id: Option<Uuid>,
    permissions: PermissionSet,
    stale: bool,
}

pub type SharedGate = Arc<RwLock<PermissionGate>>;

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the gate from the permissions returned by login.
    pub fn from_login(user_id: Uuid, permissions: PermissionSet) -> Self {
        Self {
            user_id: Some(user_id),
            permissions,
            stale: false,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Installs a freshly fetched set and clears the stale flag.
    pub fn replace(&mut self, permissions: PermissionSet) {
        self.permissions = permissions;
        self.stale = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn has(&self, codename: &str) -> bool {
        self.permissions.contains(codename)
    }

    pub fn has_any<'a>(&self, codenames: impl IntoIterator<Item = &'a str>) -> bool {
        self.permissions.has_any(codenames)
    }

    pub fn has_all<'a>(&self, codenames: impl IntoIterator<Item = &'a str>) -> bool {
        self.permissions.has_all(codenames)
    }

    pub fn allows(&self, requirement: &Requirement) -> bool {
        self.permissions.satisfies(requirement)
    }

    /// Marks the gate stale when the event says this user's permissions
    /// changed. Returns whether it did.
    pub fn observe(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::PermissionsChanged { user_id } if Some(*user_id) == self.user_id => {
                self.stale = true;
                true
            }
            _ => false,
        }
    }

    /// Wires a shared gate to a context so `permissions:changed` events mark
    /// it stale.
    pub fn attach(gate: &SharedGate, context: &mut ClientContext) -> ListenerId {
        let gate = Arc::clone(gate);
        context.on("permissions:changed", move |_, event| {
            let mut gate = gate.write().unwrap_or_else(PoisonError::into_inner);
            if gate.observe(event) {
                log::debug!(target: "adminhub::client", "permission set is stale");
            }
        })
    }
}
