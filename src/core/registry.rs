//! # Concurrent tenant registry.
//!
//! Maps tenant ids to their runtime state. Readers and writers may run in
//! parallel; `lookup`, `insert`, and `remove` are linearizable relative to
//! each other.
//!
//! ## Rules
//! - The registry imposes no lifecycle on contained states: `remove` does
//!   NOT stop a state. Callers stop, then remove.
//! - The core never iterates the map.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::core::state::TenantState;

/// Concurrent map of tenant id to tenant state.
pub(crate) struct TenantRegistry {
    tenants: DashMap<Uuid, Arc<TenantState>>,
}

impl TenantRegistry {
    pub(crate) fn new() -> Self {
        Self {
            tenants: DashMap::new(),
        }
    }

    pub(crate) fn lookup(&self, id: Uuid) -> Option<Arc<TenantState>> {
        self.tenants.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub(crate) fn insert(&self, id: Uuid, state: Arc<TenantState>) {
        self.tenants.insert(id, state);
    }

    pub(crate) fn remove(&self, id: Uuid) -> Option<Arc<TenantState>> {
        self.tenants.remove(&id).map(|(_, state)| state)
    }
}
