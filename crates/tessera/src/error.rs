//! Error types for the manager.

use tessera_bus::BusError;
use tessera_component::StoreError;

/// Errors surfaced by [`Manager`](crate::Manager) operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// An entity/component store operation was rejected.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The message bus could not be built or configured.
    #[error(transparent)]
    Bus(#[from] BusError),
}
