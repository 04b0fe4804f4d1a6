//! Bus error types.

/// Errors raised while building or configuring a [`MessageBus`](crate::MessageBus).
///
/// Handler failures are not represented here: they are contained at the
/// dispatch boundary and reported through [`HandlerFailure`](crate::HandlerFailure).
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A configuration value is out of range.
    #[error("invalid dispatch configuration: {0}")]
    InvalidConfig(String),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// The environment variable name.
        var: &'static str,
        /// The raw value found.
        value: String,
    },

    /// No tokio runtime was available to host dispatch workers.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
