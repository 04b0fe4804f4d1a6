//! Subscription registry — which subscribers want which message types.
//!
//! Membership only: a subscriber is either in a message type's set or not,
//! and subscribing twice is a no-op. Each message type's set lives behind its
//! own shard lock, so [`SubscriptionRegistry::subscribers_of`] returns a
//! consistent snapshot even while other threads subscribe and unsubscribe.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::handler::{Subscriber, SubscriberId};
use crate::message::MessageType;

/// Maps message types to their subscriber sets.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<MessageType, HashMap<SubscriberId, Subscriber>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` to `message_type`'s set.
    ///
    /// Returns `false` if it was already subscribed.
    pub fn subscribe(&self, message_type: MessageType, subscriber: Subscriber) -> bool {
        let mut set = self.subscriptions.entry(message_type).or_default();
        match set.entry(subscriber.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(subscriber);
                true
            }
        }
    }

    /// Remove `id` from `message_type`'s set, pruning the set once empty.
    ///
    /// Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, message_type: MessageType, id: SubscriberId) -> bool {
        match self.subscriptions.entry(message_type) {
            Entry::Occupied(mut set) => {
                let removed = set.get_mut().remove(&id).is_some();
                if set.get().is_empty() {
                    set.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Remove `id` from every set. Returns how many sets it was removed from.
    pub fn unsubscribe_all(&self, id: SubscriberId) -> usize {
        let mut removed = 0;
        self.subscriptions.retain(|_, set| {
            if set.remove(&id).is_some() {
                removed += 1;
            }
            !set.is_empty()
        });
        removed
    }

    /// Snapshot of `message_type`'s subscribers. Empty if there are none.
    #[must_use]
    pub fn subscribers_of(&self, message_type: MessageType) -> Vec<Subscriber> {
        self.subscriptions
            .get(&message_type)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers to `message_type`.
    #[must_use]
    pub fn subscriber_count(&self, message_type: MessageType) -> usize {
        self.subscriptions
            .get(&message_type)
            .map_or(0, |set| set.len())
    }

    /// Returns `true` if `id` is subscribed to `message_type`.
    #[must_use]
    pub fn is_subscribed(&self, message_type: MessageType, id: SubscriberId) -> bool {
        self.subscriptions
            .get(&message_type)
            .is_some_and(|set| set.contains_key(&id))
    }

    /// Every message type `id` is subscribed to.
    #[must_use]
    pub fn message_types_of(&self, id: SubscriberId) -> Vec<MessageType> {
        let mut types: Vec<MessageType> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().contains_key(&id))
            .map(|entry| *entry.key())
            .collect();
        types.sort();
        types
    }
}
