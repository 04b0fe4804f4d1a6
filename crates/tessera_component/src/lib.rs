//! # tessera_component
//!
//! The entity and component half of the registry.
//!
//! This crate provides:
//!
//! - [`Entity`] — opaque, globally unique entity identities.
//! - [`Component`] trait and [`ComponentTypeId`] — what may be attached and how
//!   kinds are told apart.
//! - [`ComponentRef`] — shared handle to one attached component instance.
//! - [`ComponentStore`] — keyed storage with add/remove/query by kind and
//!   lifecycle notifications ([`StoreEvent`]).
//! - [`EntityFactory`] — explicit per-variant entity construction.

pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod store;

pub use component::{Component, ComponentRef, ComponentTypeId};
pub use entity::Entity;
pub use error::StoreError;
pub use event::{Observer, ObserverId, StoreEvent};
pub use store::{ComponentStore, EntityFactory};
