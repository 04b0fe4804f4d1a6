//! Manager configuration.

use serde::Deserialize;
use tessera_bus::DispatchConfig;

use crate::error::EcsError;

/// Configuration for a [`Manager`](crate::Manager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Tuning for asynchronous message dispatch.
    pub dispatch: DispatchConfig,
}

impl ManagerConfig {
    /// Defaults with dispatch settings overridden from the environment.
    ///
    /// # Errors
    ///
    /// Fails if a `TESSERA_*` variable is malformed or out of range.
    pub fn from_env() -> Result<Self, EcsError> {
        Ok(Self {
            dispatch: DispatchConfig::from_env()?,
        })
    }

    /// Replace the dispatch settings.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }
}
