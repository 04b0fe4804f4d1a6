//! Store error types.

use crate::entity::Entity;

/// Errors returned when the store rejects a call.
///
/// Absence is not an error: removing a missing component or querying an
/// unknown entity returns an empty result instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The entity was never created by this store, or has been destroyed.
    #[error("unknown entity: {0}")]
    UnknownEntity(Entity),
}
