//! Keyed entity/component storage.
//!
//! The [`ComponentStore`] maps each entity to the list of components it owns,
//! in insertion order. It is a plain bookkeeping structure: a sharded
//! concurrent map gives mutual exclusion on mutation and concurrent reads,
//! which is all the message bus needs from it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::component::{Component, ComponentRef, ComponentTypeId};
use crate::entity::Entity;
use crate::error::StoreError;
use crate::event::{Observer, ObserverId, StoreEvent};

/// Builds a concrete entity variant by attaching its components.
///
/// Factories replace construct-by-kind reflection: the host picks the factory
/// for the variant it wants and hands it to [`ComponentStore::spawn`].
///
/// Any `Fn(&ComponentStore, Entity) -> Result<(), StoreError>` is a factory.
pub trait EntityFactory {
    /// Attach the variant's components to the freshly created `entity`.
    ///
    /// # Errors
    ///
    /// Propagates any [`StoreError`] raised while attaching components.
    fn assemble(&self, store: &ComponentStore, entity: Entity) -> Result<(), StoreError>;
}

impl<F> EntityFactory for F
where
    F: Fn(&ComponentStore, Entity) -> Result<(), StoreError>,
{
    fn assemble(&self, store: &ComponentStore, entity: Entity) -> Result<(), StoreError> {
        self(store, entity)
    }
}

/// Entity/component storage with lifecycle notifications.
#[derive(Default)]
pub struct ComponentStore {
    /// Components owned by each live entity, in insertion order.
    entities: DashMap<Entity, Vec<ComponentRef>>,
    /// Registered lifecycle observers.
    observers: DashMap<ObserverId, Observer>,
    next_observer: AtomicU64,
}

impl ComponentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity with no components.
    pub fn create_entity(&self) -> Entity {
        let entity = Entity::generate();
        self.entities.insert(entity, Vec::new());
        debug!(%entity, "entity created");
        self.notify(&StoreEvent::EntityCreated(entity));
        entity
    }

    /// Create a new entity and let `factory` attach its components.
    ///
    /// # Errors
    ///
    /// Returns whatever the factory returns. The entity stays alive with the
    /// components attached so far; destroying it is up to the caller.
    pub fn spawn<F: EntityFactory + ?Sized>(&self, factory: &F) -> Result<Entity, StoreError> {
        let entity = self.create_entity();
        factory.assemble(self, entity)?;
        Ok(entity)
    }

    /// Destroy an entity, detaching every component it owns.
    ///
    /// Returns `false` if the entity was unknown.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        let Some((_, components)) = self.entities.remove(&entity) else {
            return false;
        };
        debug!(%entity, detached = components.len(), "entity destroyed");
        self.notify(&StoreEvent::EntityDestroyed { entity, components });
        true
    }

    /// Returns `true` if the entity is alive in this store.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Attach `value` to `entity`, returning the handle of the new instance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEntity`] if the entity is not alive.
    pub fn add_component<T: Component>(
        &self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentRef, StoreError> {
        let component = ComponentRef::new(value);
        {
            let mut owned = self
                .entities
                .get_mut(&entity)
                .ok_or(StoreError::UnknownEntity(entity))?;
            owned.push(component.clone());
        }
        self.notify(&StoreEvent::ComponentAdded {
            entity,
            component: component.clone(),
        });
        Ok(component)
    }

    /// Detach one specific component instance.
    ///
    /// Returns `false` when the entity is unknown or does not own the
    /// instance; neither case is an error.
    pub fn remove_component(&self, entity: Entity, component: &ComponentRef) -> bool {
        let removed = {
            let Some(mut owned) = self.entities.get_mut(&entity) else {
                return false;
            };
            owned
                .iter()
                .position(|c| c.ptr_eq(component))
                .map(|pos| owned.remove(pos))
        };
        match removed {
            Some(component) => {
                self.notify(&StoreEvent::ComponentRemoved { entity, component });
                true
            }
            None => false,
        }
    }

    /// The first component of type `T` attached to `entity`, in insertion
    /// order.
    ///
    /// Typed queries match the concrete type, so two types that share a
    /// [`Component::type_name`] never shadow each other here.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<Arc<T>> {
        self.entities
            .get(&entity)?
            .iter()
            .find(|c| c.is::<T>())
            .and_then(ComponentRef::downcast::<T>)
    }

    /// The first component of `kind` attached to `entity`, in insertion order.
    #[must_use]
    pub fn get_component_of(&self, entity: Entity, kind: ComponentTypeId) -> Option<ComponentRef> {
        self.entities
            .get(&entity)?
            .iter()
            .find(|c| c.kind() == kind)
            .cloned()
    }

    /// Every component of type `T` attached to `entity`, in insertion order.
    #[must_use]
    pub fn get_components<T: Component>(&self, entity: Entity) -> Vec<Arc<T>> {
        self.entities
            .get(&entity)
            .map(|owned| {
                owned
                    .iter()
                    .filter(|c| c.is::<T>())
                    .filter_map(ComponentRef::downcast::<T>)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every component of `kind` attached to `entity`, in insertion order.
    #[must_use]
    pub fn get_components_of(&self, entity: Entity, kind: ComponentTypeId) -> Vec<ComponentRef> {
        self.entities
            .get(&entity)
            .map(|owned| owned.iter().filter(|c| c.kind() == kind).cloned().collect())
            .unwrap_or_default()
    }

    /// Every component attached to `entity`, in insertion order.
    #[must_use]
    pub fn get_all_components(&self, entity: Entity) -> Vec<ComponentRef> {
        self.entities
            .get(&entity)
            .map(|owned| owned.value().clone())
            .unwrap_or_default()
    }

    /// Entities holding at least one component of type `T`. Order is
    /// unspecified.
    #[must_use]
    pub fn entities_with_component<T: Component>(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|entry| entry.value().iter().any(ComponentRef::is::<T>))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Entities holding at least one component of `kind`. Order is
    /// unspecified.
    #[must_use]
    pub fn entities_with(&self, kind: ComponentTypeId) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|entry| entry.value().iter().any(|c| c.kind() == kind))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Register a lifecycle observer.
    ///
    /// Observers run on the mutating thread after the store has released its
    /// internal locks, so they may call back into the store.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, Arc::new(observer));
        id
    }

    /// Stop notifying an observer. Returns `false` if it was not registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    fn notify(&self, event: &StoreEvent) {
        if self.observers.is_empty() {
            return;
        }
        let observers: Vec<Observer> = self
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for observer in observers {
            observer(event);
        }
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("entities", &self.entities.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32, f32);

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    impl Component for Tag {
        fn type_name() -> &'static str {
            "Tag"
        }
    }

    #[test]
    fn test_add_then_get() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        store.add_component(e, Position(1.0, 2.0)).unwrap();
        assert_eq!(*store.get_component::<Position>(e).unwrap(), Position(1.0, 2.0));
        assert!(store.get_component::<Tag>(e).is_none());
    }

    #[test]
    fn test_add_to_unknown_entity_is_rejected() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        assert!(store.destroy_entity(e));
        assert_eq!(
            store.add_component(e, Tag("late")),
            Err(StoreError::UnknownEntity(e))
        );
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn test_first_match_in_insertion_order() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        let first = store.add_component(e, Tag("first")).unwrap();
        store.add_component(e, Position(0.0, 0.0)).unwrap();
        store.add_component(e, Tag("second")).unwrap();

        assert_eq!(store.get_component::<Tag>(e).unwrap().0, "first");
        let tags: Vec<_> = store.get_components::<Tag>(e).iter().map(|t| t.0).collect();
        assert_eq!(tags, vec!["first", "second"]);

        // Removing the first exposes the second.
        assert!(store.remove_component(e, &first));
        assert_eq!(store.get_component::<Tag>(e).unwrap().0, "second");
    }

    #[test]
    fn test_remove_last_of_kind_empties_lookup() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        let pos = store.add_component(e, Position(1.0, 1.0)).unwrap();
        assert!(store.remove_component(e, &pos));
        assert!(store.get_component::<Position>(e).is_none());
        assert!(store.get_components_of(e, Position::component_type_id()).is_empty());
    }

    #[test]
    fn test_remove_is_identity_based_and_idempotent() {
        let store = ComponentStore::new();
        let a = store.create_entity();
        let b = store.create_entity();
        let on_a = store.add_component(a, Tag("x")).unwrap();
        store.add_component(b, Tag("x")).unwrap();

        // Same value, different instance: not owned by b.
        assert!(!store.remove_component(b, &on_a));
        assert!(store.remove_component(a, &on_a));
        assert!(!store.remove_component(a, &on_a));
        assert_eq!(store.get_all_components(b).len(), 1);
    }

    #[test]
    fn test_queries_on_unknown_entity_are_empty() {
        let store = ComponentStore::new();
        let other = ComponentStore::new().create_entity();
        assert!(store.get_component::<Tag>(other).is_none());
        assert!(store.get_components::<Tag>(other).is_empty());
        assert!(store.get_all_components(other).is_empty());
        assert!(!store.destroy_entity(other));
    }

    #[test]
    fn test_unknown_kind_query_is_empty() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        store.add_component(e, Tag("x")).unwrap();
        let unknown = ComponentTypeId::from_name("NeverRegistered");
        assert!(store.get_component_of(e, unknown).is_none());
        assert!(store.entities_with(unknown).is_empty());
    }

    #[test]
    fn test_get_all_components_preserves_order() {
        let store = ComponentStore::new();
        let e = store.create_entity();
        let a = store.add_component(e, Tag("a")).unwrap();
        let b = store.add_component(e, Position(0.0, 1.0)).unwrap();
        let c = store.add_component(e, Tag("c")).unwrap();
        assert_eq!(store.get_all_components(e), vec![a, b, c]);
    }

    #[test]
    fn test_entities_with_component() {
        let store = ComponentStore::new();
        let a = store.create_entity();
        let b = store.create_entity();
        let c = store.create_entity();
        store.add_component(a, Position(0.0, 0.0)).unwrap();
        store.add_component(b, Tag("b")).unwrap();
        let cp = store.add_component(c, Position(1.0, 1.0)).unwrap();
        store.add_component(c, Position(2.0, 2.0)).unwrap();

        let holders: HashSet<_> = store.entities_with_component::<Position>().into_iter().collect();
        assert_eq!(holders, HashSet::from([a, c]));

        // c still holds one Position after removing the other.
        store.remove_component(c, &cp);
        let holders: HashSet<_> = store.entities_with_component::<Position>().into_iter().collect();
        assert_eq!(holders, HashSet::from([a, c]));

        store.destroy_entity(a);
        assert_eq!(store.entities_with_component::<Position>(), vec![c]);
    }

    #[test]
    fn test_same_named_types_do_not_collide() {
        mod first {
            #[derive(Debug, PartialEq)]
            pub struct Pos(pub i32);

            impl crate::Component for Pos {
                fn type_name() -> &'static str {
                    "Pos"
                }
            }
        }

        mod second {
            #[derive(Debug, PartialEq)]
            pub struct Pos(pub i32);

            impl crate::Component for Pos {
                fn type_name() -> &'static str {
                    "Pos"
                }
            }
        }

        let store = ComponentStore::new();
        let both = store.create_entity();
        let only_second = store.create_entity();
        store.add_component(both, second::Pos(1)).unwrap();
        store.add_component(both, first::Pos(2)).unwrap();
        store.add_component(only_second, second::Pos(3)).unwrap();

        assert_eq!(*store.get_component::<first::Pos>(both).unwrap(), first::Pos(2));
        assert_eq!(*store.get_component::<second::Pos>(both).unwrap(), second::Pos(1));
        assert_eq!(store.get_components::<first::Pos>(both).len(), 1);
        assert_eq!(store.entities_with_component::<first::Pos>(), vec![both]);
        let holders: HashSet<_> = store.entities_with_component::<second::Pos>().into_iter().collect();
        assert_eq!(holders, HashSet::from([both, only_second]));

        // Kind-keyed lookups still see both types under the shared name.
        assert_eq!(store.get_components_of(both, first::Pos::component_type_id()).len(), 2);
    }

    #[test]
    fn test_spawn_with_factory() {
        fn soldier(store: &ComponentStore, entity: Entity) -> Result<(), StoreError> {
            store.add_component(entity, Tag("soldier"))?;
            store.add_component(entity, Position(5.0, 5.0))?;
            Ok(())
        }

        let store = ComponentStore::new();
        let e = store.spawn(&soldier).unwrap();
        assert_eq!(store.get_component::<Tag>(e).unwrap().0, "soldier");
        assert_eq!(store.get_all_components(e).len(), 2);
    }

    #[test]
    fn test_observers_see_lifecycle() {
        let store = ComponentStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subjects = Arc::new(Mutex::new(HashSet::new()));
        let sink = Arc::clone(&seen);
        let subject_sink = Arc::clone(&subjects);
        let id = store.observe(move |event| {
            let label = match event {
                StoreEvent::EntityCreated(_) => "created",
                StoreEvent::EntityDestroyed { .. } => "destroyed",
                StoreEvent::ComponentAdded { .. } => "added",
                StoreEvent::ComponentRemoved { .. } => "removed",
            };
            sink.lock().push(label);
            subject_sink.lock().insert(event.entity());
        });

        let e = store.create_entity();
        let t = store.add_component(e, Tag("t")).unwrap();
        store.remove_component(e, &t);
        // No-op removal does not notify.
        store.remove_component(e, &t);
        store.add_component(e, Tag("u")).unwrap();
        store.destroy_entity(e);

        assert_eq!(
            *seen.lock(),
            vec!["created", "added", "removed", "added", "destroyed"]
        );
        assert_eq!(*subjects.lock(), HashSet::from([e]));

        assert!(store.unobserve(id));
        assert!(!store.unobserve(id));
        store.create_entity();
        assert_eq!(seen.lock().len(), 5);
    }

    #[test]
    fn test_destroy_reports_detached_components() {
        let store = ComponentStore::new();
        let detached = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&detached);
        store.observe(move |event| {
            if let StoreEvent::EntityDestroyed { components, .. } = event {
                sink.lock().extend(components.iter().cloned());
            }
        });

        let e = store.create_entity();
        let a = store.add_component(e, Tag("a")).unwrap();
        let b = store.add_component(e, Position(0.0, 0.0)).unwrap();
        assert!(store.destroy_entity(e));
        assert!(!store.contains(e));
        assert_eq!(*detached.lock(), vec![a, b]);
    }

    #[test]
    fn test_observer_may_reenter_store() {
        let store = Arc::new(ComponentStore::new());
        let inner = Arc::downgrade(&store);
        store.observe(move |event| {
            if let (StoreEvent::ComponentAdded { entity, .. }, Some(store)) = (event, inner.upgrade()) {
                // Reading back inside the callback must not deadlock.
                assert!(!store.get_all_components(*entity).is_empty());
            }
        });
        let e = store.create_entity();
        store.add_component(e, Tag("reentrant")).unwrap();
    }
}
