//! The simulation orchestrator: lifecycle state machine, commands,
//! queries and publishing.
//!
//! ```text
//!            start                pause
//! stopped ---------> running <-----------> paused
//!    ^                 |  ^     start
//!    |      stop       |  |
//!    +-----------------+  +---- restart (from any state, fresh world)
//! ```
//!
//! Commands are idempotent: repeating one that changes nothing records no
//! event. Only `running` advances the tick counter; `running` and `paused`
//! serve live queries.

use chrono::Utc;
use nexus_reasoning::allocation;
use nexus_types::{
    Building, CitySnapshot, EmergencyId, EngineId, Event, EventType, GridPos, Metrics,
    Notification, Pong, ReasoningLogEntry, Severity, SimulationPhase, SimulationStatus, Vehicle,
    VehicleStatus, Weather,
};
use serde_json::json;
use tracing::{info, warn};

use crate::bus::{EventBus, Subscription};
use crate::config::SimulationConfig;
use crate::error::{CommandError, QueryError, SetupError};
use crate::history::EventLog;
use crate::metrics;
use crate::state::CityState;
use crate::tick::{self, Engines, TickSummary};

/// Owns the world and every engine.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    phase: SimulationPhase,
    state: CityState,
    engines: Engines,
    events: EventLog,
    bus: EventBus,
}

impl Simulation {
    /// Generate the starting city from configuration. The simulation
    /// starts `stopped`.
    pub fn new(config: SimulationConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let state = CityState::generate(&config.world, &config.fleet)?;
        Ok(Self::with_state(config, state))
    }

    /// Wrap a hand-built world.
    pub fn with_state(config: SimulationConfig, mut state: CityState) -> Self {
        baseline_power(&mut state, config.power.total_capacity);
        info!(
            grid_size = state.city.size(),
            vehicles = state.vehicles.len(),
            buildings = state.city.building_count(),
            seed = config.world.seed,
            "simulation initialized"
        );
        Self {
            engines: Engines::from_config(&config),
            events: EventLog::new(config.history.event_capacity),
            bus: EventBus::new(config.bus.capacity),
            phase: SimulationPhase::Stopped,
            state,
            config,
        }
    }

    /// The configuration in use.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub const fn phase(&self) -> SimulationPhase {
        self.phase
    }

    /// `{state, tick, weather}`.
    pub const fn status(&self) -> SimulationStatus {
        SimulationStatus {
            state: self.phase,
            tick: self.state.tick,
            weather: self.state.city.weather(),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Enter `running` from `stopped` or `paused`. Starting from `stopped`
    /// continues the current world.
    pub fn start(&mut self) -> SimulationStatus {
        let from = self.phase;
        if from == SimulationPhase::Running {
            return self.status();
        }
        self.phase = SimulationPhase::Running;
        let verb = if from == SimulationPhase::Paused {
            "resumed"
        } else {
            "started"
        };
        info!(tick = self.state.tick, from = ?from, "simulation {verb}");
        self.emit(Event::new(
            self.state.tick,
            EventType::SimulationStarted,
            Severity::Info,
            format!("Simulation {verb} at tick {}", self.state.tick),
            json!({ "from": from }),
        ));
        self.status()
    }

    /// Alias for [`start`](Self::start) from `paused`.
    pub fn resume(&mut self) -> SimulationStatus {
        self.start()
    }

    /// Enter `paused` from `running`. A no-op otherwise.
    pub fn pause(&mut self) -> SimulationStatus {
        if self.phase != SimulationPhase::Running {
            return self.status();
        }
        self.phase = SimulationPhase::Paused;
        info!(tick = self.state.tick, "simulation paused");
        self.emit(Event::new(
            self.state.tick,
            EventType::SimulationPaused,
            Severity::Info,
            format!("Simulation paused at tick {}", self.state.tick),
            serde_json::Value::Null,
        ));
        self.status()
    }

    /// Enter `stopped`. The world is kept; `start` continues it.
    pub fn stop(&mut self) -> SimulationStatus {
        if self.phase == SimulationPhase::Stopped {
            return self.status();
        }
        self.phase = SimulationPhase::Stopped;
        info!(tick = self.state.tick, "simulation stopped");
        self.emit(Event::new(
            self.state.tick,
            EventType::SimulationStopped,
            Severity::Info,
            format!("Simulation stopped at tick {}", self.state.tick),
            serde_json::Value::Null,
        ));
        self.status()
    }

    /// Rebuild the world from the configured seed, clear every history,
    /// reset the tick counter and enter `running`.
    pub fn restart(&mut self) -> Result<SimulationStatus, CommandError> {
        let mut state = CityState::generate(&self.config.world, &self.config.fleet)?;
        baseline_power(&mut state, self.config.power.total_capacity);
        let previous_tick = self.state.tick;
        self.state = state;
        self.engines.reset();
        self.events.clear();
        self.phase = SimulationPhase::Running;
        info!(previous_tick, "simulation restarted");
        self.emit(Event::new(
            0,
            EventType::SimulationRestarted,
            Severity::Info,
            format!("Simulation restarted after {previous_tick} ticks"),
            json!({ "previous_tick": previous_tick, "seed": self.config.world.seed }),
        ));
        Ok(self.status())
    }

    /// Change the weather. Accepts `clear`, `rain` or `snow`, case
    /// insensitive.
    pub fn set_weather(&mut self, value: &str) -> Result<SimulationStatus, CommandError> {
        let weather: Weather = value.parse()?;
        let from = self.state.city.weather();
        if self.state.city.set_weather(weather) {
            info!(%from, to = %weather, "weather changed");
            self.emit(Event::new(
                self.state.tick,
                EventType::WeatherChanged,
                Severity::Info,
                format!("Weather changed from {from} to {weather}"),
                json!({ "from": from, "to": weather }),
            ));
        }
        Ok(self.status())
    }

    /// Close a road cell, optionally for `duration` ticks. Vehicles whose
    /// remaining path crosses it drop the path, go idle and are re-routed
    /// on the next tick.
    pub fn block_road(
        &mut self,
        pos: GridPos,
        duration: Option<u64>,
    ) -> Result<SimulationStatus, CommandError> {
        let tick = self.state.tick;
        let until = duration.map(|d| tick.saturating_add(d));
        if !self.state.city.block(pos, "manual closure", tick, until)? {
            return Ok(self.status());
        }
        let mut affected = Vec::new();
        for v in self.state.vehicles.values_mut() {
            if v.path.contains(&pos) {
                v.path.clear();
                v.status = VehicleStatus::Idle;
                affected.push(v.id);
            }
        }
        info!(%pos, ?until, affected = affected.len(), "road blocked");
        self.emit(Event::new(
            tick,
            EventType::RoadBlocked,
            Severity::Warning,
            format!("Road at {pos} closed, {} vehicle(s) re-routing", affected.len()),
            json!({ "pos": pos, "until_tick": until, "affected": affected }),
        ));
        Ok(self.status())
    }

    /// Reopen a road cell. Reopening an open cell changes nothing.
    pub fn unblock_road(&mut self, pos: GridPos) -> Result<SimulationStatus, CommandError> {
        self.state.city.check_bounds(pos)?;
        if let Some(segment) = self.state.city.unblock(pos) {
            info!(%pos, "road unblocked");
            self.emit(Event::new(
                self.state.tick,
                EventType::RoadUnblocked,
                Severity::Info,
                format!("Road at {pos} reopened"),
                json!({ "pos": pos, "reason": segment.reason, "expired": false }),
            ));
        }
        Ok(self.status())
    }

    /// Withdraw an open emergency. Its plan is abandoned and the responder
    /// sent home.
    pub fn cancel_emergency(&mut self, id: EmergencyId) -> Result<SimulationStatus, CommandError> {
        let open = self
            .state
            .emergencies
            .get(&id)
            .is_some_and(|e| !e.is_resolved());
        if !open {
            return Err(CommandError::UnknownEmergency(id));
        }
        let Some(emergency) = self.state.emergencies.remove(&id) else {
            return Err(CommandError::UnknownEmergency(id));
        };
        self.state.cancelled = self.state.cancelled.saturating_add(1);
        let tick = self.state.tick;
        if let Some(context) = self.engines.planner.cancel(id, &mut self.state.vehicles) {
            let entry = self.engines.explainer.record(tick, context);
            self.bus.publish(Notification::Reasoning(Box::new(entry)));
        }
        info!(emergency = %id, "emergency cancelled");
        self.emit(Event::new(
            tick,
            EventType::EmergencyCancelled,
            Severity::Info,
            format!("{} {id} cancelled", emergency.kind),
            json!({ "emergency": id, "released": emergency.assigned_vehicle }),
        ));
        Ok(self.status())
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one tick if `running`, then publish its events, reasoning and
    /// a state update. Returns `None` when not running.
    pub fn tick(&mut self) -> Option<TickSummary> {
        if self.phase != SimulationPhase::Running {
            return None;
        }
        let output = tick::run_tick(&mut self.state, &mut self.engines, &self.config);
        for event in output.events {
            self.emit(event);
        }
        for entry in output.reasoning {
            self.bus.publish(Notification::Reasoning(Box::new(entry)));
        }
        if self.bus.subscriber_count() > 0 {
            self.bus
                .publish(Notification::StateUpdate(Box::new(self.state.snapshot())));
        }
        Some(output.summary)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    const fn live(&self) -> Result<(), QueryError> {
        if self.phase.is_live() {
            Ok(())
        } else {
            Err(QueryError::NotLive(self.phase))
        }
    }

    /// Full city snapshot.
    pub fn city_state(&self) -> Result<CitySnapshot, QueryError> {
        self.live()?;
        Ok(self.state.snapshot())
    }

    /// Every vehicle.
    pub fn vehicles(&self) -> Result<Vec<Vehicle>, QueryError> {
        self.live()?;
        Ok(self.state.vehicles.values().cloned().collect())
    }

    /// Every building.
    pub fn buildings(&self) -> Result<Vec<Building>, QueryError> {
        self.live()?;
        Ok(self.state.city.buildings().cloned().collect())
    }

    /// Aggregate metrics.
    pub fn metrics(&self) -> Result<Metrics, QueryError> {
        self.live()?;
        Ok(metrics::collect(
            &self.state,
            &self.engines,
            self.config.power.total_capacity,
        ))
    }

    /// Up to `limit` events, newest first. Available in every state.
    pub fn events(&self, limit: usize) -> Vec<Event> {
        self.events.recent(limit)
    }

    /// Up to `limit` reasoning entries, newest first, optionally for one
    /// engine. Available in every state.
    pub fn reasoning(&self, limit: usize, engine: Option<EngineId>) -> Vec<ReasoningLogEntry> {
        self.engines.explainer.recent(limit, engine)
    }

    /// [`reasoning`](Self::reasoning) with the engine filter given by name.
    pub fn reasoning_by_name(
        &self,
        limit: usize,
        engine: Option<&str>,
    ) -> Result<Vec<ReasoningLogEntry>, QueryError> {
        let engine = engine.map(str::parse::<EngineId>).transpose()?;
        Ok(self.reasoning(limit, engine))
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Attach a subscriber to the outbound bus.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe(self.state.tick)
    }

    /// A clone of the bus, for publishers outside the orchestrator.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Answer a subscriber keep-alive.
    pub fn ping(&self, nonce: u64) -> Notification {
        Notification::Pong(Pong {
            nonce,
            tick: self.state.tick,
            timestamp: Utc::now(),
        })
    }

    /// Record an event in the history and publish it.
    fn emit(&mut self, event: Event) {
        self.events.push(event.clone());
        self.bus.publish(Notification::Event(Box::new(event)));
    }
}

/// Give every building its initial share before the first tick.
fn baseline_power(state: &mut CityState, capacity: u32) {
    if let Err(e) = allocation::reallocate(&mut state.city, capacity, state.tick) {
        warn!(error = %e, "baseline power allocation failed, buildings start unpowered");
    }
}
