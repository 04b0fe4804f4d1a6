//! # tessera_bus
//!
//! In-process publish/subscribe for the tessera registry.
//!
//! This crate provides:
//!
//! - [`message`] — immutable [`Message`] records tagged by [`MessageType`].
//! - [`handler`] — the [`MessageHandler`] capability and [`SubscriberId`].
//! - [`subscription`] — which subscribers want which message types.
//! - [`inbox`] — per-subscriber queues drained by an elastic worker pool.
//! - [`bus`] — [`MessageBus`], synchronous and asynchronous broadcast.
//! - [`failure`] — containment and reporting of handler failures.
//! - [`config`] — [`DispatchConfig`] and its environment overrides.

pub mod bus;
pub mod config;
pub mod error;
pub mod failure;
pub mod handler;
pub mod inbox;
pub mod message;
pub mod subscription;

pub use bus::MessageBus;
pub use config::DispatchConfig;
pub use error::BusError;
pub use failure::{FailureHook, FailureKind, HandlerFailure, contain};
pub use handler::{MessageHandler, Subscriber, SubscriberId};
pub use inbox::{InboxStats, ScalingPolicy};
pub use message::{DeliveryMode, Message, MessageType, Opaque};
pub use subscription::SubscriptionRegistry;
