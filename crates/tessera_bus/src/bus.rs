//! The message bus — subscription bookkeeping plus broadcast.
//!
//! [`MessageBus::broadcast`] snapshots the subscribers of a message type and
//! then either calls every handler on the caller's thread
//! ([`DeliveryMode::Sync`]) or drops the message into each subscriber's
//! elastic inbox and returns at once ([`DeliveryMode::Async`]).

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::config::DispatchConfig;
use crate::error::BusError;
use crate::failure::{FailureHook, HandlerFailure, deliver};
use crate::handler::{MessageHandler, Subscriber, SubscriberId};
use crate::inbox::{Inbox, InboxStats};
use crate::message::{DeliveryMode, Message, MessageType, Opaque};
use crate::subscription::SubscriptionRegistry;

/// Subscription registry, per-subscriber inboxes, and broadcast.
pub struct MessageBus {
    subscriptions: SubscriptionRegistry,
    inboxes: DashMap<SubscriberId, Arc<Inbox>>,
    config: DispatchConfig,
    runtime: Handle,
    failure_hook: Option<FailureHook>,
}

impl MessageBus {
    /// Create a bus whose workers run on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoRuntime`] outside a runtime context and
    /// [`BusError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: DispatchConfig) -> Result<Self, BusError> {
        Self::with_runtime(config, Handle::try_current()?)
    }

    /// Create a bus whose workers run on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if `config` fails validation.
    pub fn with_runtime(config: DispatchConfig, runtime: Handle) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self {
            subscriptions: SubscriptionRegistry::new(),
            inboxes: DashMap::new(),
            config,
            runtime,
            failure_hook: None,
        })
    }

    /// Install a host callback for handler failures. Affects inboxes created
    /// afterwards and every synchronous broadcast.
    #[must_use]
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    /// The dispatch configuration in effect.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Subscribe `handler` to `message_type`.
    ///
    /// Returns `false` if it was already subscribed.
    pub fn subscribe<H: MessageHandler>(&self, message_type: impl Into<MessageType>, handler: &Arc<H>) -> bool {
        self.subscribe_subscriber(message_type.into(), Subscriber::new(handler))
    }

    /// Subscribe an already type-erased handler.
    pub fn subscribe_dyn(&self, message_type: impl Into<MessageType>, handler: Arc<dyn MessageHandler>) -> bool {
        self.subscribe_subscriber(message_type.into(), Subscriber::from_dyn(handler))
    }

    fn subscribe_subscriber(&self, message_type: MessageType, subscriber: Subscriber) -> bool {
        let id = subscriber.id();
        let added = self.subscriptions.subscribe(message_type, subscriber.clone());
        self.inboxes
            .entry(id)
            .or_insert_with(|| Arc::new(self.new_inbox(&subscriber)));
        if added {
            debug!(subscriber = %id, message_type = message_type.0, "subscribed");
        }
        added
    }

    /// Stop future deliveries of `message_type` to `handler`. Messages already
    /// queued for it are still delivered.
    ///
    /// Returns `false` if it was not subscribed.
    pub fn unsubscribe<H: MessageHandler + ?Sized>(&self, message_type: impl Into<MessageType>, handler: &Arc<H>) -> bool {
        self.unsubscribe_id(message_type.into(), SubscriberId::of(handler))
    }

    /// [`unsubscribe`](Self::unsubscribe) by id.
    pub fn unsubscribe_id(&self, message_type: MessageType, id: SubscriberId) -> bool {
        let removed = self.subscriptions.unsubscribe(message_type, id);
        if removed {
            debug!(subscriber = %id, message_type = message_type.0, "unsubscribed");
        }
        removed
    }

    /// Explicit teardown: unsubscribe `id` from every message type and forget
    /// its inbox. Queued messages still drain on the inbox's workers.
    ///
    /// Returns how many subscriptions were dropped.
    pub fn release(&self, id: SubscriberId) -> usize {
        let dropped = self.subscriptions.unsubscribe_all(id);
        let had_inbox = self.inboxes.remove(&id).is_some();
        if had_inbox || dropped > 0 {
            debug!(subscriber = %id, dropped, "subscriber released");
        }
        dropped
    }

    /// Returns `true` if `handler` is subscribed to `message_type`.
    #[must_use]
    pub fn is_subscribed<H: MessageHandler + ?Sized>(&self, message_type: impl Into<MessageType>, handler: &Arc<H>) -> bool {
        self.subscriptions
            .is_subscribed(message_type.into(), SubscriberId::of(handler))
    }

    /// Snapshot of the subscribers of `message_type`.
    #[must_use]
    pub fn subscribers_of(&self, message_type: impl Into<MessageType>) -> Vec<Subscriber> {
        self.subscriptions.subscribers_of(message_type.into())
    }

    /// Number of subscribers to `message_type`.
    #[must_use]
    pub fn subscriber_count(&self, message_type: impl Into<MessageType>) -> usize {
        self.subscriptions.subscriber_count(message_type.into())
    }

    /// Counters for a subscriber's inbox, if it has one.
    #[must_use]
    pub fn inbox_stats(&self, id: SubscriberId) -> Option<InboxStats> {
        self.inboxes.get(&id).map(|inbox| inbox.stats())
    }

    /// Broadcast a message to every current subscriber of `message_type`.
    ///
    /// Returns the number of subscribers the message was handed to. Zero
    /// subscribers is a no-op.
    pub fn broadcast<P: Any + Send + Sync>(
        &self,
        sender: Option<Opaque>,
        message_type: impl Into<MessageType>,
        payload: P,
        mode: DeliveryMode,
    ) -> usize {
        let message = Message::new(message_type, mode)
            .with_payload(payload)
            .with_sender(sender);
        self.send(message)
    }

    /// Synchronous broadcast without a sender.
    pub fn broadcast_sync<P: Any + Send + Sync>(&self, message_type: impl Into<MessageType>, payload: P) -> usize {
        self.broadcast(None, message_type, payload, DeliveryMode::Sync)
    }

    /// Asynchronous broadcast without a sender.
    pub fn broadcast_async<P: Any + Send + Sync>(&self, message_type: impl Into<MessageType>, payload: P) -> usize {
        self.broadcast(None, message_type, payload, DeliveryMode::Async)
    }

    /// Dispatch a prebuilt message according to its [`DeliveryMode`].
    pub fn send(&self, message: Message) -> usize {
        let message_type = message.message_type();
        let subscribers = self.subscriptions.subscribers_of(message_type);
        if subscribers.is_empty() {
            trace!(message_type = message_type.0, "broadcast without subscribers");
            return 0;
        }

        match message.mode() {
            DeliveryMode::Sync => {
                for subscriber in &subscribers {
                    deliver(subscriber, &message, self.failure_hook.as_ref());
                }
            }
            DeliveryMode::Async => {
                let message = Arc::new(message);
                for subscriber in &subscribers {
                    self.inbox_for(message_type, subscriber)
                        .enqueue(Arc::clone(&message));
                }
            }
        }
        trace!(
            message_type = message_type.0,
            subscribers = subscribers.len(),
            "broadcast"
        );
        subscribers.len()
    }

    /// The subscriber's inbox.
    ///
    /// A subscriber that is still subscribed but has no inbox (a `release`
    /// raced its `subscribe`) gets a new registered one. A subscriber
    /// snapshotted just before a concurrent `release` gets a detached inbox
    /// that lives only until its workers drain it.
    fn inbox_for(&self, message_type: MessageType, subscriber: &Subscriber) -> Arc<Inbox> {
        let id = subscriber.id();
        if let Some(inbox) = self.inboxes.get(&id) {
            return Arc::clone(inbox.value());
        }
        if self.subscriptions.is_subscribed(message_type, id) {
            trace!(subscriber = %id, "registering a missing inbox");
            let inbox = self
                .inboxes
                .entry(id)
                .or_insert_with(|| Arc::new(self.new_inbox(subscriber)));
            return Arc::clone(inbox.value());
        }
        trace!(subscriber = %id, "delivering through a detached inbox");
        Arc::new(self.new_inbox(subscriber))
    }

    fn new_inbox(&self, subscriber: &Subscriber) -> Inbox {
        Inbox::new(
            subscriber.clone(),
            &self.config,
            self.runtime.clone(),
            self.failure_hook.clone(),
        )
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscriptions", &self.subscriptions)
            .field("inboxes", &self.inboxes.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
        modes: Mutex<Vec<DeliveryMode>>,
    }

    impl MessageHandler for Counter {
        fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
            self.hits.fetch_add(1, Ordering::AcqRel);
            self.modes.lock().push(message.mode());
            Ok(())
        }
    }

    async fn eventually(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if done() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        done()
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(matches!(
            MessageBus::new(DispatchConfig::default()),
            Err(BusError::NoRuntime(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_config_rejected() {
        let config = DispatchConfig::default().with_messages_per_worker(0);
        assert!(matches!(
            MessageBus::new(config),
            Err(BusError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broadcast_without_subscribers_is_noop() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        assert_eq!(bus.broadcast_async(1, ()), 0);
        assert_eq!(bus.broadcast_sync(1, ()), 0);
        assert_eq!(bus.inboxes.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_broadcast_completes_before_return() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        bus.subscribe(3, &a);
        bus.subscribe(3, &b);

        assert_eq!(bus.broadcast_sync(3, "payload"), 2);
        assert_eq!(a.hits.load(Ordering::Acquire), 1);
        assert_eq!(b.hits.load(Ordering::Acquire), 1);
        assert_eq!(*a.modes.lock(), vec![DeliveryMode::Sync]);
        // Sync delivery never touches the inbox.
        assert_eq!(bus.inbox_stats(SubscriberId::of(&a)).unwrap().spawned, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_broadcast_is_delivered() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        bus.subscribe(4, &a);
        for _ in 0..10 {
            bus.broadcast_async(4, 1_u32);
        }
        assert!(eventually(Duration::from_secs(5), || a.hits.load(Ordering::Acquire) == 10).await);
        assert!(a.modes.lock().iter().all(|m| *m == DeliveryMode::Async));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_inbox_shared_across_message_types() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        bus.subscribe(1, &a);
        bus.subscribe(2, &a);
        assert_eq!(bus.inboxes.len(), 1);
        bus.broadcast_async(1, ());
        bus.broadcast_async(2, ());
        assert!(eventually(Duration::from_secs(5), || a.hits.load(Ordering::Acquire) == 2).await);
        assert_eq!(bus.inbox_stats(SubscriberId::of(&a)).unwrap().delivered, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_release_drops_everything() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        bus.subscribe(1, &a);
        bus.subscribe(2, &a);
        assert_eq!(bus.release(SubscriberId::of(&a)), 2);
        assert!(bus.inbox_stats(SubscriberId::of(&a)).is_none());
        assert_eq!(bus.broadcast_sync(1, ()), 0);
        assert_eq!(bus.release(SubscriberId::of(&a)), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_inbox_is_registered_while_subscribed() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        let id = SubscriberId::of(&a);
        bus.subscribe(6, &a);
        // The state a release interleaved with subscribe leaves behind.
        bus.inboxes.remove(&id);

        for _ in 0..3 {
            bus.broadcast_async(6, ());
        }
        assert!(eventually(Duration::from_secs(5), || a.hits.load(Ordering::Acquire) == 3).await);
        assert_eq!(bus.inboxes.len(), 1);
        assert_eq!(bus.inbox_stats(id).unwrap().delivered, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_detached_inbox_after_release_is_not_registered() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        bus.subscribe(6, &a);
        let snapshot = bus.subscribers_of(6);
        bus.release(SubscriberId::of(&a));

        // A broadcast that snapshotted before the release still delivers.
        bus.inbox_for(MessageType(6), &snapshot[0])
            .enqueue(Arc::new(Message::new(6, DeliveryMode::Async)));
        assert!(eventually(Duration::from_secs(5), || a.hits.load(Ordering::Acquire) == 1).await);
        assert!(bus.inbox_stats(SubscriberId::of(&a)).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_type_erased_subscriber() {
        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let a = Arc::new(Counter::default());
        let erased: Arc<dyn MessageHandler> = a.clone();
        assert!(bus.subscribe_dyn(5, Arc::clone(&erased)));
        // Same allocation, same subscriber.
        assert!(!bus.subscribe(5, &a));
        assert!(bus.is_subscribed(5, &erased));
        assert_eq!(bus.subscriber_count(5), 1);

        let shared: Opaque = Arc::new(17_u32);
        let message = Message::new(5, DeliveryMode::Sync).with_shared_payload(Some(shared));
        assert_eq!(bus.send(message), 1);
        assert_eq!(a.hits.load(Ordering::Acquire), 1);
        assert!(bus.unsubscribe(5, &erased));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_hook_sees_sync_failures() {
        struct Broken;

        impl MessageHandler for Broken {
            fn handle_message(&self, _message: &Message) -> anyhow::Result<()> {
                anyhow::bail!("cannot handle")
            }
        }

        let failures = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&failures);
        let bus = MessageBus::new(DispatchConfig::default())
            .unwrap()
            .with_failure_hook(move |_| {
                sink.fetch_add(1, Ordering::AcqRel);
            });
        let broken = Arc::new(Broken);
        let fine = Arc::new(Counter::default());
        bus.subscribe(8, &broken);
        bus.subscribe(8, &fine);

        assert_eq!(bus.broadcast_sync(8, ()), 2);
        assert_eq!(failures.load(Ordering::Acquire), 1);
        assert_eq!(fine.hits.load(Ordering::Acquire), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sender_reaches_handler() {
        struct SenderCheck(Mutex<Option<String>>);

        impl MessageHandler for SenderCheck {
            fn handle_message(&self, message: &Message) -> anyhow::Result<()> {
                *self.0.lock() = message.sender_as::<String>().cloned();
                Ok(())
            }
        }

        let bus = MessageBus::new(DispatchConfig::default()).unwrap();
        let check = Arc::new(SenderCheck(Mutex::new(None)));
        bus.subscribe(2, &check);
        let sender: Opaque = Arc::new("physics".to_string());
        bus.broadcast(Some(sender), 2, (), DeliveryMode::Sync);
        assert_eq!(check.0.lock().as_deref(), Some("physics"));
    }
}
