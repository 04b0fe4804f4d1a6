//! Dispatch configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::BusError;

/// Environment variable overriding [`DispatchConfig::messages_per_worker`].
pub const MESSAGES_PER_WORKER_ENV: &str = "TESSERA_MESSAGES_PER_WORKER";

/// Environment variable overriding [`DispatchConfig::max_workers_per_subscriber`].
pub const MAX_WORKERS_ENV: &str = "TESSERA_MAX_WORKERS";

/// Environment variable overriding [`DispatchConfig::idle_linger_ms`].
pub const IDLE_LINGER_ENV: &str = "TESSERA_IDLE_LINGER_MS";

/// Backlog handled per worker before another worker is justified.
pub const DEFAULT_MESSAGES_PER_WORKER: usize = 100;

/// How long the last worker of an empty inbox waits for more work.
pub const DEFAULT_IDLE_LINGER_MS: u64 = 25;

/// Tuning for the elastic per-subscriber worker pools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Queue depth each worker is expected to absorb. An inbox wants
    /// `ceil(depth / messages_per_worker)` workers.
    pub messages_per_worker: usize,
    /// Hard ceiling on workers per subscriber. `None` leaves the pool bounded
    /// only by backlog.
    pub max_workers_per_subscriber: Option<usize>,
    /// Milliseconds the sole remaining worker waits on an empty queue before
    /// exiting.
    pub idle_linger_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            messages_per_worker: DEFAULT_MESSAGES_PER_WORKER,
            max_workers_per_subscriber: None,
            idle_linger_ms: DEFAULT_IDLE_LINGER_MS,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by any `TESSERA_*` environment variables present.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidEnv`] if a variable is set but does not
    /// parse, or [`BusError::InvalidConfig`] if the result fails
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, BusError> {
        let mut config = Self::default();
        if let Some(v) = read_env(MESSAGES_PER_WORKER_ENV)? {
            config.messages_per_worker = v;
        }
        if let Some(v) = read_env(MAX_WORKERS_ENV)? {
            config.max_workers_per_subscriber = Some(v);
        }
        if let Some(v) = read_env(IDLE_LINGER_ENV)? {
            config.idle_linger_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Override the per-worker backlog.
    #[must_use]
    pub fn with_messages_per_worker(mut self, messages: usize) -> Self {
        self.messages_per_worker = messages;
        self
    }

    /// Cap the number of workers per subscriber.
    #[must_use]
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers_per_subscriber = Some(max);
        self
    }

    /// Override how long an idle last worker lingers.
    #[must_use]
    pub fn with_idle_linger(mut self, linger: Duration) -> Self {
        self.idle_linger_ms = u64::try_from(linger.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The idle linger as a [`Duration`].
    #[must_use]
    pub fn idle_linger(&self) -> Duration {
        Duration::from_millis(self.idle_linger_ms)
    }

    /// Check that the values describe a pool that can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] for a zero per-worker backlog or a
    /// zero worker cap.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.messages_per_worker == 0 {
            return Err(BusError::InvalidConfig(
                "messages_per_worker must be at least 1".to_string(),
            ));
        }
        if self.max_workers_per_subscriber == Some(0) {
            return Err(BusError::InvalidConfig(
                "max_workers_per_subscriber must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, BusError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BusError::InvalidEnv { var, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.messages_per_worker, 100);
        assert_eq!(config.max_workers_per_subscriber, None);
        assert_eq!(config.idle_linger(), Duration::from_millis(25));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::default()
            .with_messages_per_worker(10)
            .with_max_workers(4)
            .with_idle_linger(Duration::from_millis(5));
        assert_eq!(config.messages_per_worker, 10);
        assert_eq!(config.max_workers_per_subscriber, Some(4));
        assert_eq!(config.idle_linger_ms, 5);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(matches!(
            DispatchConfig::default().with_messages_per_worker(0).validate(),
            Err(BusError::InvalidConfig(_))
        ));
        assert!(matches!(
            DispatchConfig::default().with_max_workers(0).validate(),
            Err(BusError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_deserialize_partial_json_keeps_defaults() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{ "messages_per_worker": 50 }"#).unwrap();
        assert_eq!(config.messages_per_worker, 50);
        assert_eq!(config.idle_linger_ms, DEFAULT_IDLE_LINGER_MS);
    }
}
