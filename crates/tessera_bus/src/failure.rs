//! Containment and reporting of handler failures.
//!
//! Every handler invocation, on either broadcast path, goes through
//! [`deliver`]. An `Err` or a panic is turned into a [`HandlerFailure`],
//! logged, and forwarded to the host's [`FailureHook`] if one is installed.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::handler::{Subscriber, SubscriberId};
use crate::message::{DeliveryMode, Message, MessageType};

/// How a handler invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler returned an error.
    Error(String),
    /// The handler panicked.
    Panic(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Panic(msg) => write!(f, "panic: {msg}"),
        }
    }
}

/// A failed handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// The subscriber whose handler failed.
    pub subscriber: SubscriberId,
    /// The subscriber's name.
    pub subscriber_name: String,
    /// Type of the message being handled.
    pub message_type: MessageType,
    /// Path the message was delivered through.
    pub mode: DeliveryMode,
    /// What went wrong.
    pub kind: FailureKind,
}

/// Host observability hook for handler failures.
pub type FailureHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// Invoke `subscriber`'s handler, containing any failure.
///
/// Reporting runs host code too (the handler's name and the hook) and is
/// contained separately.
///
/// Returns `true` if the handler completed successfully.
pub(crate) fn deliver(subscriber: &Subscriber, message: &Message, hook: Option<&FailureHook>) -> bool {
    let Err(kind) = contain(|| subscriber.handler().handle_message(message)) else {
        return true;
    };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| report(subscriber, message, kind, hook))) {
        error!(
            subscriber = %subscriber.id(),
            message_type = message.message_type().0,
            panic = %panic_message(panic.as_ref()),
            "failure reporting panicked"
        );
    }
    false
}

fn report(subscriber: &Subscriber, message: &Message, kind: FailureKind, hook: Option<&FailureHook>) {
    let failure = HandlerFailure {
        subscriber: subscriber.id(),
        subscriber_name: subscriber.name().to_string(),
        message_type: message.message_type(),
        mode: message.mode(),
        kind,
    };
    error!(
        subscriber = %failure.subscriber_name,
        message_type = failure.message_type.0,
        mode = ?failure.mode,
        failure = %failure.kind,
        "message handler failed"
    );
    if let Some(hook) = hook {
        hook(&failure);
    }
}

/// Run `f`, turning an error or a panic into a [`FailureKind`].
///
/// Also used by the tick driver, so system ticks get the same containment
/// as message handlers.
pub fn contain<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, FailureKind> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(FailureKind::Error(format!("{err:#}"))),
        Err(panic) => Err(FailureKind::Panic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
