//! Async front end: a shared handle for commands and queries, and the
//! paced tick loop.
//!
//! The [`Simulation`] sits behind an `Arc<tokio::sync::Mutex<_>>`. A tick
//! holds the lock for its whole duration, so commands and queries issued
//! from other tasks wait for the tick boundary and never see a partially
//! updated world.

use std::sync::Arc;
use std::time::Duration;

use nexus_types::{
    Building, CitySnapshot, EmergencyId, EngineId, Event, GridPos, Metrics, Notification,
    ReasoningLogEntry, SimulationStatus, Vehicle,
};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::bus::Subscription;
use crate::error::{CommandError, QueryError};
use crate::orchestrator::Simulation;
use crate::tick::TickSummary;

/// Callback invoked after each tick completes.
pub trait TickCallback: Send {
    /// Called after a tick ran.
    fn on_tick(&mut self, summary: &TickSummary);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary) {}
}

/// Cloneable, task-safe handle to one simulation.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    inner: Arc<Mutex<Simulation>>,
    tick_interval: Duration,
}

impl SimulationHandle {
    /// Share a simulation.
    pub fn new(simulation: Simulation) -> Self {
        let tick_interval = Duration::from_millis(simulation.config().world.tick_interval_ms.max(1));
        Self {
            inner: Arc::new(Mutex::new(simulation)),
            tick_interval,
        }
    }

    /// Wall-clock pacing of the tick loop.
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Run one tick now, if running.
    pub async fn tick(&self) -> Option<TickSummary> {
        self.inner.lock().await.tick()
    }

    /// See [`Simulation::start`].
    pub async fn start(&self) -> SimulationStatus {
        self.inner.lock().await.start()
    }

    /// See [`Simulation::resume`].
    pub async fn resume(&self) -> SimulationStatus {
        self.inner.lock().await.resume()
    }

    /// See [`Simulation::pause`].
    pub async fn pause(&self) -> SimulationStatus {
        self.inner.lock().await.pause()
    }

    /// See [`Simulation::stop`].
    pub async fn stop(&self) -> SimulationStatus {
        self.inner.lock().await.stop()
    }

    /// See [`Simulation::restart`].
    pub async fn restart(&self) -> Result<SimulationStatus, CommandError> {
        self.inner.lock().await.restart()
    }

    /// See [`Simulation::set_weather`].
    pub async fn set_weather(&self, value: &str) -> Result<SimulationStatus, CommandError> {
        self.inner.lock().await.set_weather(value)
    }

    /// See [`Simulation::block_road`].
    pub async fn block_road(
        &self,
        pos: GridPos,
        duration: Option<u64>,
    ) -> Result<SimulationStatus, CommandError> {
        self.inner.lock().await.block_road(pos, duration)
    }

    /// See [`Simulation::unblock_road`].
    pub async fn unblock_road(&self, pos: GridPos) -> Result<SimulationStatus, CommandError> {
        self.inner.lock().await.unblock_road(pos)
    }

    /// See [`Simulation::cancel_emergency`].
    pub async fn cancel_emergency(&self, id: EmergencyId) -> Result<SimulationStatus, CommandError> {
        self.inner.lock().await.cancel_emergency(id)
    }

    /// Current `{state, tick, weather}`.
    pub async fn status(&self) -> SimulationStatus {
        self.inner.lock().await.status()
    }

    /// See [`Simulation::city_state`].
    pub async fn city_state(&self) -> Result<CitySnapshot, QueryError> {
        self.inner.lock().await.city_state()
    }

    /// See [`Simulation::vehicles`].
    pub async fn vehicles(&self) -> Result<Vec<Vehicle>, QueryError> {
        self.inner.lock().await.vehicles()
    }

    /// See [`Simulation::buildings`].
    pub async fn buildings(&self) -> Result<Vec<Building>, QueryError> {
        self.inner.lock().await.buildings()
    }

    /// See [`Simulation::metrics`].
    pub async fn metrics(&self) -> Result<Metrics, QueryError> {
        self.inner.lock().await.metrics()
    }

    /// See [`Simulation::events`].
    pub async fn events(&self, limit: usize) -> Vec<Event> {
        self.inner.lock().await.events(limit)
    }

    /// See [`Simulation::reasoning`].
    pub async fn reasoning(&self, limit: usize, engine: Option<EngineId>) -> Vec<ReasoningLogEntry> {
        self.inner.lock().await.reasoning(limit, engine)
    }

    /// Attach a bus subscriber.
    pub async fn subscribe(&self) -> Subscription {
        self.inner.lock().await.subscribe()
    }

    /// Answer a keep-alive ping.
    pub async fn ping(&self, nonce: u64) -> Notification {
        self.inner.lock().await.ping(nonce)
    }
}

/// Drive the simulation at its configured rate until `shutdown` flips to
/// `true` or its sender is dropped. Returns how many ticks ran.
///
/// Pacing is best effort: a tick that overruns its slot delays the next
/// one and missed slots are skipped, not replayed.
pub async fn run_loop(
    handle: SimulationHandle,
    mut shutdown: watch::Receiver<bool>,
    callback: &mut dyn TickCallback,
) -> u64 {
    let mut interval = tokio::time::interval(handle.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut total: u64 = 0;

    info!(
        tick_interval_ms = u64::try_from(handle.tick_interval.as_millis()).unwrap_or(u64::MAX),
        "tick loop starting"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(summary) = handle.tick().await {
                    total = total.saturating_add(1);
                    callback.on_tick(&summary);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(total_ticks = total, "tick loop stopped");
    total
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

    use super::*;
    use crate::config::SimulationConfig;
    use nexus_types::SimulationPhase;

    struct Counter(u64);

    impl TickCallback for Counter {
        fn on_tick(&mut self, _summary: &TickSummary) {
            self.0 += 1;
        }
    }

    fn handle() -> SimulationHandle {
        let mut config = SimulationConfig::default();
        config.probability.accident_base_rate = 0.0;
        config.probability.fire_base_rate = 0.0;
        SimulationHandle::new(Simulation::new(config).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_shutdown() {
        let handle = handle();
        handle.start().await;
        let (tx, rx) = watch::channel(false);
        let runner = handle.clone();
        let task = tokio::spawn(async move {
            let mut counter = Counter(0);
            let total = run_loop(runner, rx, &mut counter).await;
            (total, counter.0)
        });

        tokio::time::sleep(handle.tick_interval() * 5).await;
        tx.send(true).unwrap();
        let (total, seen) = task.await.unwrap();
        assert_eq!(total, seen);
        assert!(total >= 5);
        assert_eq!(handle.status().await.tick, total);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_simulation_holds_its_tick() {
        let handle = handle();
        handle.start().await;
        let (tx, rx) = watch::channel(false);
        let runner = handle.clone();
        let task = tokio::spawn(async move { run_loop(runner, rx, &mut NoOpCallback).await });

        tokio::time::sleep(handle.tick_interval() * 3).await;
        let paused = handle.pause().await;
        assert_eq!(paused.state, SimulationPhase::Paused);
        tokio::time::sleep(handle.tick_interval() * 10).await;
        assert_eq!(handle.status().await.tick, paused.tick);

        drop(tx);
        assert_eq!(task.await.unwrap(), paused.tick);
    }

    #[tokio::test]
    async fn commands_through_handle() {
        let handle = handle();
        assert!(handle.city_state().await.is_err());
        handle.start().await;
        assert!(handle.city_state().await.is_ok());
        assert!(handle.set_weather("hail").await.is_err());
        assert!(handle.tick().await.is_some());
        assert!(!handle.events(10).await.is_empty());
        let mut sub = handle.subscribe().await;
        assert!(matches!(sub.try_recv(), Some(Notification::Connection(_))));
    }
}
