//! Tick driver.
//!
//! Owns the tick counter and the wall clock between ticks, and runs one
//! system's tick with failure containment. The manager decides whether the
//! systems of a tick run one after another or fan out in parallel.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tessera_bus::{FailureKind, contain};
use tracing::warn;

use crate::system::{System, TickContext};

/// A system whose tick failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFailure {
    /// The system's name.
    pub system: String,
    /// What went wrong.
    pub kind: FailureKind,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The tick's counter value.
    pub tick_id: u64,
    /// Delta handed to every system.
    pub elapsed: Duration,
    /// Systems whose tick ran, successfully or not.
    pub ticked: usize,
    /// Systems whose tick failed.
    pub failures: Vec<TickFailure>,
}

impl TickReport {
    pub(crate) fn new(tick_id: u64, elapsed: Duration) -> Self {
        Self {
            tick_id,
            elapsed,
            ticked: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: Result<(), TickFailure>) {
        self.ticked += 1;
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
    }

    /// Returns `true` if every system ticked cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
struct Clock {
    tick_id: u64,
    last: Instant,
}

/// Tick counter plus the instant of the previous tick.
#[derive(Debug)]
pub struct TickDriver {
    clock: Mutex<Clock>,
}

impl TickDriver {
    /// A driver whose first measured delta starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Mutex::new(Clock {
                tick_id: 0,
                last: Instant::now(),
            }),
        }
    }

    /// Start a tick, measuring the delta since the previous one.
    pub fn advance(&self) -> (u64, Duration) {
        let mut clock = self.clock.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(clock.last);
        clock.last = now;
        clock.tick_id += 1;
        (clock.tick_id, elapsed)
    }

    /// Start a tick whose delta the host supplies. The wall clock is still
    /// reset so a later [`advance`](Self::advance) measures from here.
    pub fn advance_unmeasured(&self) -> u64 {
        let mut clock = self.clock.lock();
        clock.last = Instant::now();
        clock.tick_id += 1;
        clock.tick_id
    }

    /// Ticks started so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.clock.lock().tick_id
    }
}

impl Default for TickDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one system's tick, containing errors and panics.
pub(crate) fn run_system(system: &dyn System, ctx: &TickContext<'_>) -> Result<(), TickFailure> {
    contain(|| system.tick(ctx)).map_err(|kind| {
        warn!(
            system = system.name(),
            tick_id = ctx.tick_id,
            failure = %kind,
            "system tick failed"
        );
        TickFailure {
            system: system.name().to_string(),
            kind,
        }
    })
}
