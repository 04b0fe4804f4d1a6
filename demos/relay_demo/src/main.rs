//! # relay_demo
//!
//! A small host driving a [`tessera::Manager`]:
//!
//! 1. Spawn a handful of ships with `Position` and `Velocity` components.
//! 2. Register a movement system that integrates positions every tick and
//!    announces arrivals on the bus.
//! 3. Register a relay system that records arrivals asynchronously and logs a
//!    summary when pinged synchronously.
//! 4. Flood the relay with telemetry to show the worker pool growing and
//!    shrinking with backlog.
//!
//! Dispatch tuning is read from `TESSERA_*` environment variables.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tessera::{
    Component, ComponentStore, Entity, Manager, ManagerConfig, Message, MessageHandler,
    MessageType, StoreError, System, TickContext,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const ARRIVED: MessageType = MessageType(1);
const TELEMETRY: MessageType = MessageType(2);
const REPORT: MessageType = MessageType(3);

const TICKS: u64 = 20;
const TICK_RATE: f64 = 30.0;
const TELEMETRY_BURST: usize = 450;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f64,
}

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    dx: f64,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Attaches a position and a velocity.
fn ship(speed: f64) -> impl Fn(&ComponentStore, Entity) -> Result<(), StoreError> {
    move |store: &ComponentStore, entity: Entity| {
        store.add_component(entity, Position { x: 0.0 })?;
        store.add_component(entity, Velocity { dx: speed })?;
        Ok(())
    }
}

/// Integrates positions and announces ships that cross the finish line.
struct Movement {
    finish: f64,
}

impl MessageHandler for Movement {
    fn name(&self) -> &str {
        "movement"
    }

    fn handle_message(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

impl System for Movement {
    fn tick(&self, ctx: &TickContext<'_>) -> Result<()> {
        let manager = ctx.manager;
        for entity in manager.entities_with_component::<Velocity>() {
            let (Some(pos), Some(vel)) = (
                manager.get_component::<Position>(entity),
                manager.get_component::<Velocity>(entity),
            ) else {
                continue;
            };
            let moved = Position {
                x: pos.x + vel.dx * ctx.dt(),
            };

            // Components are immutable once attached: swap in the new value.
            if let Some(old) = manager
                .get_all_components(entity)
                .into_iter()
                .find(|c| c.is::<Position>())
            {
                manager.remove_component(entity, &old);
            }
            manager.add_component(entity, moved)?;

            if pos.x < self.finish && moved.x >= self.finish {
                manager.broadcast_async(ARRIVED, (entity, ctx.tick_id));
            }
        }
        Ok(())
    }
}

/// Collects arrivals and telemetry.
#[derive(Default)]
struct Relay {
    arrivals: Mutex<Vec<(Entity, u64)>>,
    telemetry: AtomicUsize,
}

impl MessageHandler for Relay {
    fn name(&self) -> &str {
        "relay"
    }

    fn handle_message(&self, message: &Message) -> Result<()> {
        match message.message_type() {
            ARRIVED => {
                if let Some(&(entity, tick)) = message.payload_as::<(Entity, u64)>() {
                    info!(%entity, tick, "ship arrived");
                    self.arrivals.lock().push((entity, tick));
                }
            }
            TELEMETRY => {
                std::thread::sleep(Duration::from_micros(500));
                self.telemetry.fetch_add(1, Ordering::AcqRel);
            }
            REPORT => info!(
                arrivals = self.arrivals.lock().len(),
                telemetry = self.telemetry.load(Ordering::Acquire),
                "relay report"
            ),
            other => debug!(message_type = %other, "ignored"),
        }
        Ok(())
    }
}

impl System for Relay {
    fn tick(&self, _ctx: &TickContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay_demo=info".parse()?))
        .init();

    let manager = Manager::new(ManagerConfig::from_env()?)?.with_failure_hook(|failure| {
        warn!(subscriber = %failure.subscriber_name, kind = %failure.kind, "handler failed");
    });

    for speed in [4.0, 6.0, 9.0] {
        let entity = manager.spawn(&ship(speed))?;
        info!(%entity, speed, "ship launched");
    }

    let movement = Arc::new(Movement { finish: 3.0 });
    let relay = Arc::new(Relay::default());
    manager.register_system(&movement);
    manager.register_system(&relay);
    for message_type in [ARRIVED, TELEMETRY, REPORT] {
        manager.subscribe(message_type, &relay);
    }

    let tick_duration = Duration::from_secs_f64(1.0 / TICK_RATE);
    for _ in 0..TICKS {
        let report = manager.tick_with(tick_duration);
        if !report.is_clean() {
            warn!(tick_id = report.tick_id, failures = report.failures.len(), "tick had failures");
        }
        tokio::time::sleep(tick_duration).await;
    }

    for seq in 0..TELEMETRY_BURST {
        manager.broadcast_async(TELEMETRY, seq);
    }
    if let Some(stats) = manager.inbox_stats(&relay) {
        info!(queued = stats.queued, workers = stats.active_workers, "telemetry burst queued");
    }
    while manager
        .inbox_stats(&relay)
        .is_some_and(|s| s.queued > 0 || s.active_workers > 0)
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if let Some(stats) = manager.inbox_stats(&relay) {
        info!(
            delivered = stats.delivered,
            spawned = stats.spawned,
            "telemetry drained"
        );
    }

    manager.broadcast_sync(REPORT, ());
    manager.release_system(&relay);
    manager.release_system(&movement);
    info!(tick_id = manager.tick_id(), "relay demo finished");
    Ok(())
}
