//! Per-subscriber elastic inbox.
//!
//! Each subscriber owns one [`Inbox`]: an unbounded FIFO queue plus a pool of
//! worker routines that drain it. The pool grows with backlog, by at most one
//! worker per enqueue, and shrinks as soon as a worker finds the remaining
//! backlog no longer needs it.
//!
//! ## Locking
//!
//! The queue mutex guards three decisions:
//!
//! 1. enqueue: push, then spawn a worker if the pool is short,
//! 2. worker: pop the next message, or
//! 3. worker: decrement the active count and exit.
//!
//! Because spawn and exit are decided under the same lock, the active count
//! never drops below the number of live workers and a non-empty queue always
//! has a worker. The count can briefly exceed the number of running workers
//! while a freshly spawned worker has not started yet. A worker that unwinds
//! hands its slot back under the same lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, error, trace};

use crate::config::DispatchConfig;
use crate::failure::{FailureHook, deliver};
use crate::handler::Subscriber;
use crate::message::Message;

/// Maps queue depth to the number of workers that depth justifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    messages_per_worker: usize,
    max_workers: Option<usize>,
}

impl ScalingPolicy {
    /// Build a policy. A zero `messages_per_worker` is treated as one.
    #[must_use]
    pub fn new(messages_per_worker: usize, max_workers: Option<usize>) -> Self {
        Self {
            messages_per_worker: messages_per_worker.max(1),
            max_workers: max_workers.map(|m| m.max(1)),
        }
    }

    /// Workers wanted for `depth` pending messages: `ceil(depth / per_worker)`,
    /// clamped to the cap. Zero for an empty queue, at least one otherwise.
    #[must_use]
    pub fn target_workers(&self, depth: usize) -> usize {
        let wanted = depth.div_ceil(self.messages_per_worker);
        match self.max_workers {
            Some(cap) => wanted.min(cap),
            None => wanted,
        }
    }
}

impl From<&DispatchConfig> for ScalingPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self::new(config.messages_per_worker, config.max_workers_per_subscriber)
    }
}

/// Point-in-time counters for one inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InboxStats {
    /// Messages waiting in the queue.
    pub queued: usize,
    /// Workers currently counted as active.
    pub active_workers: usize,
    /// Messages taken off the queue and handed to the handler.
    pub delivered: u64,
    /// Deliveries whose handler failed.
    pub failed: u64,
    /// Workers spawned over the inbox's lifetime.
    pub spawned: u64,
}

/// A subscriber's queue and its elastic worker pool.
pub(crate) struct Inbox {
    subscriber: Subscriber,
    queue: Mutex<VecDeque<Arc<Message>>>,
    available: Condvar,
    active: AtomicUsize,
    policy: ScalingPolicy,
    idle_linger: Duration,
    runtime: Handle,
    failure_hook: Option<FailureHook>,
    delivered: AtomicU64,
    failed: AtomicU64,
    spawned: AtomicU64,
}

impl Inbox {
    pub(crate) fn new(
        subscriber: Subscriber,
        config: &DispatchConfig,
        runtime: Handle,
        failure_hook: Option<FailureHook>,
    ) -> Self {
        Self {
            subscriber,
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            active: AtomicUsize::new(0),
            policy: ScalingPolicy::from(config),
            idle_linger: config.idle_linger(),
            runtime,
            failure_hook,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            spawned: AtomicU64::new(0),
        }
    }

    /// Append a message and grow the pool by one worker if the new depth
    /// calls for it. Never blocks beyond the queue lock.
    pub(crate) fn enqueue(self: &Arc<Self>, message: Arc<Message>) {
        let spawn = {
            let mut queue = self.queue.lock();
            queue.push_back(message);
            self.available.notify_one();
            self.claim_worker(queue.len())
        };
        if spawn {
            self.spawn_worker();
        }
    }

    /// Count one more active worker if `depth` justifies it. Callers hold the
    /// queue lock.
    fn claim_worker(&self, depth: usize) -> bool {
        let active = self.active.load(Ordering::Acquire);
        if active >= self.policy.target_workers(depth) {
            return false;
        }
        debug!(
            subscriber = %self.subscriber.name(),
            depth,
            workers = active + 1,
            "spawning dispatch worker"
        );
        self.active.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn spawn_worker(self: &Arc<Self>) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let slot = WorkerSlot(Arc::clone(self));
        // The blocking pool: handlers are synchronous and may sleep.
        drop(self.runtime.spawn_blocking(move || slot.run()));
    }

    /// Worker body: drain until the queue empties or the backlog no longer
    /// justifies this worker.
    fn run_worker(&self) {
        let mut lingered = false;
        while let Some(message) = self.next_or_retire(&mut lingered) {
            lingered = false;
            trace!(
                subscriber = %self.subscriber.name(),
                message_type = message.message_type().0,
                "delivering message"
            );
            self.delivered.fetch_add(1, Ordering::Relaxed);
            if !deliver(&self.subscriber, &message, self.failure_hook.as_ref()) {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Pop the next message, or decrement the active count and return `None`
    /// when this worker should exit. Both outcomes are decided under the
    /// queue lock.
    fn next_or_retire(&self, lingered: &mut bool) -> Option<Arc<Message>> {
        let mut queue = self.queue.lock();
        loop {
            let depth = queue.len();
            let active = self.active.load(Ordering::Acquire);

            if depth == 0 {
                // The last worker gives producers a short grace period
                // before the pool drops to zero.
                if active == 1 && !*lingered && !self.idle_linger.is_zero() {
                    *lingered = true;
                    self.available.wait_for(&mut queue, self.idle_linger);
                    continue;
                }
            } else if active <= self.policy.target_workers(depth) {
                return queue.pop_front();
            }

            debug!(
                subscriber = %self.subscriber.name(),
                depth,
                workers = active - 1,
                "dispatch worker retiring"
            );
            self.active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
    }

    /// Release the slot of a worker that unwound before retiring, and start a
    /// replacement if the backlog still needs one.
    fn replace_lost_worker(self: &Arc<Self>) {
        let spawn = {
            let queue = self.queue.lock();
            self.active.fetch_sub(1, Ordering::AcqRel);
            let active = self.active.load(Ordering::Acquire);
            let wanted = active < self.policy.target_workers(queue.len());
            if wanted {
                self.active.fetch_add(1, Ordering::AcqRel);
            }
            wanted
        };
        error!(subscriber = %self.subscriber.id(), respawn = spawn, "dispatch worker unwound");
        if spawn {
            self.spawn_worker();
        }
    }

    pub(crate) fn stats(&self) -> InboxStats {
        let queued = self.queue.lock().len();
        InboxStats {
            queued,
            active_workers: self.active.load(Ordering::Acquire),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
        }
    }
}

/// A claimed worker slot. Dropping it while unwinding hands the slot back.
struct WorkerSlot(Arc<Inbox>);

impl WorkerSlot {
    fn run(self) {
        self.0.run_worker();
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.replace_lost_worker();
        }
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("subscriber", &self.subscriber)
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}
