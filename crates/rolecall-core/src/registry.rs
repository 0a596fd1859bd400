//! Process-wide tab → role registry.
//!
//! All operations take the single internal lock for their whole duration, so
//! each one is atomic with respect to the others.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::ids::{ClientId, TabId};

/// Outcome of [`RoleRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterResult {
    Accepted,
    AlreadyRegistered,
}

/// A tab bound to a role, and the connection that delivers to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub role: String,
    pub owner: ClientId,
}

/// One fan-out target returned by [`RoleRegistry::lookup_by_role`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleTarget {
    pub tab_id: TabId,
    pub owner: ClientId,
}

#[derive(Default)]
pub struct RoleRegistry {
    entries: Mutex<HashMap<TabId, Registration>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tab_id` to `role`. An existing binding is never overwritten.
    pub fn register(&self, tab_id: TabId, role: impl Into<String>, owner: ClientId) -> RegisterResult {
        let mut entries = self.entries.lock();
        if entries.contains_key(&tab_id) {
            return RegisterResult::AlreadyRegistered;
        }
        entries.insert(
            tab_id,
            Registration {
                role: role.into(),
                owner,
            },
        );
        RegisterResult::Accepted
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Every tab currently bound to `role`. Empty when nobody holds it.
    pub fn lookup_by_role(&self, role: &str) -> Vec<RoleTarget> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, reg)| reg.role == role)
            .map(|(tab_id, reg)| RoleTarget {
                tab_id: tab_id.clone(),
                owner: reg.owner.clone(),
            })
            .collect()
    }

    pub fn remove(&self, tab_id: &TabId) -> Option<Registration> {
        self.entries.lock().remove(tab_id)
    }

    /// Drop every binding delivered through `owner`. Returns the released tabs.
    pub fn remove_owner(&self, owner: &ClientId) -> Vec<TabId> {
        let mut entries = self.entries.lock();
        let released: Vec<TabId> = entries
            .iter()
            .filter(|(_, reg)| &reg.owner == owner)
            .map(|(tab_id, _)| tab_id.clone())
            .collect();
        for tab_id in &released {
            entries.remove(tab_id);
        }
        released
    }

    pub fn get(&self, tab_id: &TabId) -> Option<Registration> {
        self.entries.lock().get(tab_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
