//! System registry — the set of systems a manager ticks.
//!
//! Systems are keyed by [`SubscriberId`], the same identity the bus uses, so
//! a system registered here and subscribed there is recognisably one object.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tessera_bus::SubscriberId;

use crate::system::System;

/// Registry of tickable systems.
#[derive(Default)]
pub struct SystemRegistry {
    systems: DashMap<SubscriberId, Arc<dyn System>>,
}

impl SystemRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system.
    ///
    /// Returns `false` if it was already registered.
    pub fn register<S: System>(&self, system: &Arc<S>) -> bool {
        match self.systems.entry(SubscriberId::of(system)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(system) as Arc<dyn System>);
                true
            }
        }
    }

    /// Remove a system by id.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.systems.remove(&id).is_some()
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.systems.contains_key(&id)
    }

    /// Snapshot of the registered systems, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn System>> {
        self.systems.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .systems
            .iter()
            .map(|entry| entry.value().name().to_string())
            .collect();
        names.sort();
        f.debug_struct("SystemRegistry").field("systems", &names).finish()
    }
}
