//! The system capability and its per-tick context.

use std::time::Duration;

use tessera_bus::MessageHandler;

use crate::manager::Manager;

/// A periodically ticked processor that also reacts to bus messages.
///
/// Registration with a manager and subscription to message types are
/// independent: a system may tick without subscribing to anything, and a
/// subscribed system need not be registered.
pub trait System: MessageHandler {
    /// Advance the system by one tick.
    ///
    /// # Errors
    ///
    /// A failed tick is logged and recorded in the
    /// [`TickReport`](crate::TickReport). Other systems still tick.
    fn tick(&self, ctx: &TickContext<'_>) -> anyhow::Result<()>;
}

/// Context handed to every system on a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Monotonic tick counter, starting at 1.
    pub tick_id: u64,
    /// Wall-clock time since the previous tick.
    pub elapsed: Duration,
    /// The manager doing the ticking.
    pub manager: &'a Manager,
}

impl TickContext<'_> {
    /// Elapsed time in seconds.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}
