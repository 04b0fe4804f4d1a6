//! Message records exchanged over the bus.
//!
//! A [`Message`] is immutable once built and is shared between consumers
//! through an `Arc`, so one broadcast can be handed to any number of
//! subscribers without copying the payload.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Integer tag partitioning subscribers. Its meaning is host-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageType(pub i32);

impl From<i32> for MessageType {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which broadcast path produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Handlers ran on the broadcasting thread before `broadcast` returned.
    Sync,
    /// The message was queued and handled later by the subscriber's workers.
    Async,
}

/// Opaque shared value carried as payload or sender.
pub type Opaque = Arc<dyn Any + Send + Sync>;

/// An immutable bus message.
#[derive(Clone)]
pub struct Message {
    message_type: MessageType,
    payload: Option<Opaque>,
    sender: Option<Opaque>,
    mode: DeliveryMode,
}

impl Message {
    /// Build a message with no payload and no sender.
    #[must_use]
    pub fn new(message_type: impl Into<MessageType>, mode: DeliveryMode) -> Self {
        Self {
            message_type: message_type.into(),
            payload: None,
            sender: None,
            mode,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Attach an already shared payload.
    #[must_use]
    pub fn with_shared_payload(mut self, payload: Option<Opaque>) -> Self {
        self.payload = payload;
        self
    }

    /// Record the originating sender.
    #[must_use]
    pub fn with_sender(mut self, sender: Option<Opaque>) -> Self {
        self.sender = sender;
        self
    }

    /// The message-type tag.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The path this message was dispatched through.
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Returns `true` if delivered on the broadcasting thread.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.mode == DeliveryMode::Sync
    }

    /// The raw payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Opaque> {
        self.payload.as_ref()
    }

    /// The payload as `P`, if present and of that type.
    #[must_use]
    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.payload.as_deref()?.downcast_ref::<P>()
    }

    /// The sender, if one was recorded.
    #[must_use]
    pub fn sender(&self) -> Option<&Opaque> {
        self.sender.as_ref()
    }

    /// The sender as `S`, if present and of that type.
    #[must_use]
    pub fn sender_as<S: Any>(&self) -> Option<&S> {
        self.sender.as_deref()?.downcast_ref::<S>()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("message_type", &self.message_type)
            .field("mode", &self.mode)
            .field("has_payload", &self.payload.is_some())
            .field("has_sender", &self.sender.is_some())
            .finish()
    }
}
