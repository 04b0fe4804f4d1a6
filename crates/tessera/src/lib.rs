//! # tessera
//!
//! An in-process entity/component registry coupled to a message bus.
//!
//! This crate ties the pieces together:
//!
//! - [`Manager`] — the explicitly constructed handle over the store, the bus,
//!   and the registered systems.
//! - [`System`] and [`TickContext`] — periodically ticked processors.
//! - [`SystemRegistry`] and [`TickDriver`] — the tick set and its clock.
//! - [`ManagerConfig`] and [`EcsError`].
//!
//! The entity/component types come from [`tessera_component`] and the
//! messaging types from [`tessera_bus`]; both are re-exported here.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tessera::{Manager, ManagerConfig, Message, MessageHandler, System, TickContext};
//!
//! struct Logger;
//!
//! impl MessageHandler for Logger {
//!     fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
//!         println!("got message {}", message.message_type());
//!         Ok(())
//!     }
//! }
//!
//! impl System for Logger {
//!     fn tick(&self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
//!         println!("tick {}", ctx.tick_id);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = Manager::new(ManagerConfig::default())?;
//!     let logger = Arc::new(Logger);
//!     manager.register_system(&logger);
//!     manager.subscribe(1, &logger);
//!
//!     manager.broadcast_async(1, "hello");
//!     manager.tick();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod system;
pub mod tick;

pub use config::ManagerConfig;
pub use error::EcsError;
pub use manager::Manager;
pub use registry::SystemRegistry;
pub use system::{System, TickContext};
pub use tick::{TickDriver, TickFailure, TickReport};

pub use tessera_bus::{
    BusError, DeliveryMode, DispatchConfig, FailureHook, FailureKind, HandlerFailure, InboxStats,
    Message, MessageBus, MessageHandler, MessageType, Opaque, SubscriberId,
};
pub use tessera_component::{
    Component, ComponentRef, ComponentStore, ComponentTypeId, Entity, EntityFactory, ObserverId,
    StoreError, StoreEvent,
};
