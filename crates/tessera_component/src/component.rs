//! Core [`Component`] trait, component kinds, and type-erased handles.
//!
//! Every value attached to an entity must implement [`Component`]. The trait
//! requires `Send + Sync + 'static` so attached values can be read from any
//! thread, including message-handling workers.
//!
//! ## Kind Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. The id does not depend on compiler
//! internals, so it stays stable across builds and can be logged or stored by
//! the host.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies a component kind, derived from its name with FNV-1a 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] for a kind name.
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// The id of component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The core component trait.
///
/// Components are plain data. Logic belongs in systems.
///
/// # Examples
///
/// ```rust
/// use tessera_component::Component;
///
/// #[derive(Debug)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// A human-readable name for this component kind. Two types sharing a
    /// name are treated as the same kind.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }
}

/// A shared, immutable, type-erased handle to one attached component.
///
/// Handles compare by identity: two handles are equal only if they point at
/// the same attached instance, even when the values themselves are equal.
#[derive(Clone)]
pub struct ComponentRef {
    kind: ComponentTypeId,
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl ComponentRef {
    pub(crate) fn new<T: Component>(value: T) -> Self {
        Self {
            kind: T::component_type_id(),
            name: T::type_name(),
            value: Arc::new(value),
        }
    }

    /// The kind of the referenced component.
    #[must_use]
    pub fn kind(&self) -> ComponentTypeId {
        self.kind
    }

    /// The kind name of the referenced component.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if the component is of kind `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.kind == T::component_type_id() && self.value.is::<T>()
    }

    /// Downcast to the concrete component type.
    #[must_use]
    pub fn downcast<T: Component>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Borrow the concrete value without bumping the reference count.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if both handles refer to the same attached instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &ComponentRef) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl PartialEq for ComponentRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ComponentRef {}

impl std::fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRef")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug)]
    struct Velocity {
        x: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[test]
    fn test_component_type_id_matches_from_name() {
        assert_eq!(
            Health::component_type_id(),
            ComponentTypeId::from_name("Health")
        );
        assert_eq!(ComponentTypeId::of::<Health>(), Health::component_type_id());
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(Health::component_type_id(), Velocity::component_type_id());
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
        // FNV-1a 64 of "a".
        assert_eq!(
            ComponentTypeId::from_name("a"),
            ComponentTypeId(0xaf63_dc4c_8601_ec8c)
        );
    }

    #[test]
    fn test_ref_downcast() {
        let r = ComponentRef::new(Health {
            current: 3.0,
            max: 10.0,
        });
        assert!(r.is::<Health>());
        assert!(!r.is::<Velocity>());
        assert_eq!(r.type_name(), "Health");
        let h = r.downcast::<Health>().unwrap();
        assert_eq!(h.current, 3.0);
        assert_eq!(h.max, 10.0);
        assert!(r.downcast::<Velocity>().is_none());
        assert!(r.downcast_ref::<Velocity>().is_none());
    }

    #[test]
    fn test_ref_equality_is_identity() {
        let a = ComponentRef::new(Velocity { x: 1.0 });
        let b = ComponentRef::new(Velocity { x: 1.0 });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.downcast_ref::<Velocity>().unwrap().x, 1.0);
    }
}
