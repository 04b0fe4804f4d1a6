//! Store lifecycle notifications.
//!
//! Observers registered with
//! [`ComponentStore::observe`](crate::store::ComponentStore::observe) receive a
//! [`StoreEvent`] for every entity creation and destruction and for every
//! component attach and detach.

use std::sync::Arc;

use crate::component::ComponentRef;
use crate::entity::Entity;

/// A change to the store's contents.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A new entity was created.
    EntityCreated(Entity),
    /// An entity was destroyed. `components` holds everything that was still
    /// attached, in insertion order.
    EntityDestroyed {
        entity: Entity,
        components: Vec<ComponentRef>,
    },
    /// A component was attached to an entity.
    ComponentAdded {
        entity: Entity,
        component: ComponentRef,
    },
    /// A component was detached from an entity.
    ComponentRemoved {
        entity: Entity,
        component: ComponentRef,
    },
}

impl StoreEvent {
    /// The entity the event is about.
    #[must_use]
    pub fn entity(&self) -> Entity {
        match self {
            Self::EntityCreated(entity)
            | Self::EntityDestroyed { entity, .. }
            | Self::ComponentAdded { entity, .. }
            | Self::ComponentRemoved { entity, .. } => *entity,
        }
    }
}

/// Handle returned by `observe`, used to stop observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

/// A store observer callback.
pub type Observer = Arc<dyn Fn(&StoreEvent) + Send + Sync>;
