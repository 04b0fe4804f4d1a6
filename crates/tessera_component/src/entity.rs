//! Entity identity.
//!
//! An [`Entity`] is an opaque, globally unique token with no data of its own.
//! Components are attached to entities through the
//! [`ComponentStore`](crate::store::ComponentStore) to give them meaning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique entity identifier.
///
/// Entities are pure identifiers. They are minted by the store, never reused,
/// and stay valid as map keys after the entity has been destroyed (lookups
/// simply come back empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(Uuid);

impl Entity {
    /// Mint a fresh random identity.
    #[must_use]
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Rebuild an entity from a raw UUID, e.g. one a host persisted in its
    /// own records.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}
