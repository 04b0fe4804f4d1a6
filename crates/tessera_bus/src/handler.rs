//! The message-handling capability and subscriber identity.

use std::sync::Arc;

use crate::message::Message;

/// Anything that can receive bus messages.
///
/// Handlers are shared between the broadcasting thread and dispatch workers,
/// and may run on several workers at once when their backlog is deep.
pub trait MessageHandler: Send + Sync + 'static {
    /// A label used in logs and failure reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle one message.
    ///
    /// # Errors
    ///
    /// An error is reported through the bus's failure reporting and never
    /// reaches the broadcaster. The next message is still delivered.
    fn handle_message(&self, message: &Message) -> anyhow::Result<()>;
}

/// Identity of a subscribed handler: the address of its shared allocation.
///
/// The bus keeps an `Arc` to every handler it knows about, so an id cannot
/// be reused by another handler while it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(usize);

impl SubscriberId {
    /// The id of a shared handler.
    #[must_use]
    pub fn of<H: ?Sized>(handler: &Arc<H>) -> Self {
        Self(Arc::as_ptr(handler).cast::<()>() as usize)
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A handler together with its identity.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    handler: Arc<dyn MessageHandler>,
}

impl Subscriber {
    /// Wrap a shared handler.
    #[must_use]
    pub fn new<H: MessageHandler>(handler: &Arc<H>) -> Self {
        let id = SubscriberId::of(handler);
        let handler: Arc<dyn MessageHandler> = Arc::clone(handler) as Arc<dyn MessageHandler>;
        Self { id, handler }
    }

    /// Wrap an already type-erased handler.
    #[must_use]
    pub fn from_dyn(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            id: SubscriberId::of(&handler),
            handler,
        }
    }

    /// The subscriber's identity.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The subscriber's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handler.name()
    }

    /// The handler itself.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}
