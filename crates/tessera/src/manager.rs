//! The manager — one explicitly constructed handle over the entity/component
//! store, the message bus, and the ticked systems.
//!
//! There is no process-wide instance. Hosts build a [`Manager`], share it
//! (typically in an `Arc`), and tear systems down explicitly with
//! [`Manager::release_system`].

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tessera_bus::{
    DeliveryMode, HandlerFailure, InboxStats, Message, MessageBus, MessageHandler, MessageType,
    Opaque, SubscriberId,
};
use tessera_component::{
    Component, ComponentRef, ComponentStore, Entity, EntityFactory, ObserverId, StoreError,
    StoreEvent,
};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::EcsError;
use crate::registry::SystemRegistry;
use crate::system::{System, TickContext};
use crate::tick::{TickDriver, TickFailure, TickReport, run_system};

/// Entity/component store, message bus, and system registry under one handle.
pub struct Manager {
    store: ComponentStore,
    bus: MessageBus,
    systems: SystemRegistry,
    driver: TickDriver,
    config: ManagerConfig,
}

impl Manager {
    /// Build a manager whose dispatch workers run on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Fails outside a runtime context or if the dispatch configuration is
    /// invalid.
    pub fn new(config: ManagerConfig) -> Result<Self, EcsError> {
        let runtime = Handle::try_current().map_err(tessera_bus::BusError::from)?;
        Self::with_runtime(config, runtime)
    }

    /// Build a manager whose dispatch workers run on `runtime`.
    ///
    /// # Errors
    ///
    /// Fails if the dispatch configuration is invalid.
    pub fn with_runtime(config: ManagerConfig, runtime: Handle) -> Result<Self, EcsError> {
        let bus = MessageBus::with_runtime(config.dispatch.clone(), runtime)?;
        info!(
            messages_per_worker = config.dispatch.messages_per_worker,
            max_workers = ?config.dispatch.max_workers_per_subscriber,
            idle_linger_ms = config.dispatch.idle_linger_ms,
            "manager created"
        );
        Ok(Self {
            store: ComponentStore::new(),
            bus,
            systems: SystemRegistry::new(),
            driver: TickDriver::new(),
            config,
        })
    }

    /// Install a host callback for message handler failures.
    #[must_use]
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.bus = self.bus.with_failure_hook(hook);
        self
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The underlying entity/component store.
    #[must_use]
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    /// The underlying message bus.
    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Entities and components
    // -----------------------------------------------------------------------

    /// Create an entity with no components.
    pub fn create_entity(&self) -> Entity {
        self.store.create_entity()
    }

    /// Create an entity and let `factory` attach its components.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error.
    pub fn spawn<F: EntityFactory + ?Sized>(&self, factory: &F) -> Result<Entity, EcsError> {
        Ok(self.store.spawn(factory)?)
    }

    /// Destroy an entity and detach its components.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        self.store.destroy_entity(entity)
    }

    /// Attach `value` to `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownEntity`] if the entity is not alive.
    pub fn add_component<T: Component>(&self, entity: Entity, value: T) -> Result<ComponentRef, StoreError> {
        self.store.add_component(entity, value)
    }

    /// Detach one component instance.
    pub fn remove_component(&self, entity: Entity, component: &ComponentRef) -> bool {
        self.store.remove_component(entity, component)
    }

    /// The first component of kind `T` on `entity`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<Arc<T>> {
        self.store.get_component(entity)
    }

    /// Every component of kind `T` on `entity`.
    #[must_use]
    pub fn get_components<T: Component>(&self, entity: Entity) -> Vec<Arc<T>> {
        self.store.get_components(entity)
    }

    /// Every component on `entity`.
    #[must_use]
    pub fn get_all_components(&self, entity: Entity) -> Vec<ComponentRef> {
        self.store.get_all_components(entity)
    }

    /// Entities holding at least one component of kind `T`.
    #[must_use]
    pub fn entities_with_component<T: Component>(&self) -> Vec<Entity> {
        self.store.entities_with_component::<T>()
    }

    /// Register a store lifecycle observer.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.store.observe(observer)
    }

    /// Remove a store lifecycle observer.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.store.unobserve(id)
    }

    // -----------------------------------------------------------------------
    // Systems
    // -----------------------------------------------------------------------

    /// Add a system to the tick set. Returns `false` if already registered.
    pub fn register_system<S: System>(&self, system: &Arc<S>) -> bool {
        let added = self.systems.register(system);
        if added {
            info!(system = system.name(), "system registered");
        }
        added
    }

    /// Remove a system from the tick set. Its subscriptions are untouched.
    pub fn unregister_system<S: System + ?Sized>(&self, system: &Arc<S>) -> bool {
        let removed = self.systems.unregister(SubscriberId::of(system));
        if removed {
            info!(system = system.name(), "system unregistered");
        }
        removed
    }

    /// Explicit teardown: unregister the system and drop every subscription
    /// and the inbox it holds on the bus.
    pub fn release_system<S: System + ?Sized>(&self, system: &Arc<S>) {
        let id = SubscriberId::of(system);
        let registered = self.systems.unregister(id);
        let subscriptions = self.bus.release(id);
        debug!(system = system.name(), registered, subscriptions, "system released");
    }

    /// Returns `true` if the system is in the tick set.
    #[must_use]
    pub fn is_registered<S: System + ?Sized>(&self, system: &Arc<S>) -> bool {
        self.systems.contains(SubscriberId::of(system))
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Subscribe `handler` to `message_type`. Returns `false` if already
    /// subscribed.
    pub fn subscribe<H: MessageHandler>(&self, message_type: impl Into<MessageType>, handler: &Arc<H>) -> bool {
        self.bus.subscribe(message_type, handler)
    }

    /// Stop future deliveries of `message_type` to `handler`.
    pub fn unsubscribe<H: MessageHandler + ?Sized>(&self, message_type: impl Into<MessageType>, handler: &Arc<H>) -> bool {
        self.bus.unsubscribe(message_type, handler)
    }

    /// Broadcast to every subscriber of `message_type`. Returns the number
    /// of subscribers reached.
    pub fn broadcast<P: Any + Send + Sync>(
        &self,
        sender: Option<Opaque>,
        message_type: impl Into<MessageType>,
        payload: P,
        mode: DeliveryMode,
    ) -> usize {
        self.bus.broadcast(sender, message_type, payload, mode)
    }

    /// Deliver on this thread before returning.
    pub fn broadcast_sync<P: Any + Send + Sync>(&self, message_type: impl Into<MessageType>, payload: P) -> usize {
        self.bus.broadcast_sync(message_type, payload)
    }

    /// Queue for each subscriber's workers and return immediately.
    pub fn broadcast_async<P: Any + Send + Sync>(&self, message_type: impl Into<MessageType>, payload: P) -> usize {
        self.bus.broadcast_async(message_type, payload)
    }

    /// Dispatch a prebuilt message.
    pub fn send(&self, message: Message) -> usize {
        self.bus.send(message)
    }

    /// Inbox counters for `handler`, if it has ever subscribed.
    #[must_use]
    pub fn inbox_stats<H: MessageHandler + ?Sized>(&self, handler: &Arc<H>) -> Option<InboxStats> {
        self.bus.inbox_stats(SubscriberId::of(handler))
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Tick every registered system once, sequentially, on this thread. The
    /// delta is the wall-clock time since the previous tick, or since
    /// construction for the first one.
    pub fn tick(&self) -> TickReport {
        let (tick_id, elapsed) = self.driver.advance();
        self.tick_sequential(tick_id, elapsed)
    }

    /// [`tick`](Self::tick) with a host-supplied delta.
    pub fn tick_with(&self, elapsed: Duration) -> TickReport {
        let tick_id = self.driver.advance_unmeasured();
        self.tick_sequential(tick_id, elapsed)
    }

    fn tick_sequential(&self, tick_id: u64, elapsed: Duration) -> TickReport {
        let systems = self.systems.snapshot();
        debug!(tick_id, dt = elapsed.as_secs_f64(), systems = systems.len(), "tick start");

        let ctx = TickContext {
            tick_id,
            elapsed,
            manager: self,
        };
        let mut report = TickReport::new(tick_id, elapsed);
        for system in &systems {
            report.record(run_system(system.as_ref(), &ctx));
        }
        report
    }

    /// Tick every registered system once, each on the blocking pool, and
    /// wait for all of them.
    pub async fn tick_parallel(self: &Arc<Self>) -> TickReport {
        let (tick_id, elapsed) = self.driver.advance();
        let systems = self.systems.snapshot();
        debug!(
            tick_id,
            dt = elapsed.as_secs_f64(),
            systems = systems.len(),
            "parallel tick start"
        );

        let mut tasks = JoinSet::new();
        for system in systems {
            let manager = Arc::clone(self);
            tasks.spawn_blocking(move || {
                let ctx = TickContext {
                    tick_id,
                    elapsed,
                    manager: &manager,
                };
                run_system(system.as_ref(), &ctx)
            });
        }

        let mut report = TickReport::new(tick_id, elapsed);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    warn!(tick_id, error = %err, "system tick task did not complete");
                    report.record(Err(TickFailure {
                        system: "<unknown>".to_string(),
                        kind: tessera_bus::FailureKind::Panic(err.to_string()),
                    }));
                }
            }
        }
        report
    }

    /// Ticks started so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.driver.tick_id()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("entities", &self.store.entity_count())
            .field("systems", &self.systems)
            .field("bus", &self.bus)
            .field("tick_id", &self.driver.tick_id())
            .finish()
    }
}
