//! Tick callback that writes a periodic heartbeat to the log.
//!
//! Every tick with spawns or engine faults is logged by the tick cycle
//! itself; this callback adds a compact `info` line every
//! [`HEARTBEAT_TICKS`] ticks so a quiet city still shows signs of life.

use nexus_core::{TickCallback, TickSummary};
use tracing::{info, warn};

/// Ticks between heartbeat lines (about ten seconds at the default rate).
pub const HEARTBEAT_TICKS: u64 = 120;

/// Counters accumulated between heartbeats.
#[derive(Debug, Default)]
pub struct LogCallback {
    spawned: u64,
    faults: u64,
    stuck: u64,
    heartbeats: u64,
}

impl LogCallback {
    /// Create a callback with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heartbeat lines written so far.
    pub const fn heartbeats(&self) -> u64 {
        self.heartbeats
    }
}

impl TickCallback for LogCallback {
    fn on_tick(&mut self, summary: &TickSummary) {
        self.spawned = self
            .spawned
            .saturating_add(u64::try_from(summary.spawned.len()).unwrap_or(u64::MAX));
        self.faults = self
            .faults
            .saturating_add(u64::try_from(summary.faults.len()).unwrap_or(u64::MAX));
        self.stuck = self.stuck.saturating_add(u64::from(summary.stuck));

        if !summary.faults.is_empty() {
            warn!(tick = summary.tick, faults = ?summary.faults, "engines faulted this tick");
        }

        if summary.tick.checked_rem(HEARTBEAT_TICKS) != Some(0) {
            return;
        }
        info!(
            tick = summary.tick,
            weather = %summary.weather,
            active_plans = summary.active_plans,
            spawned = self.spawned,
            stuck = self.stuck,
            faults = self.faults,
            "heartbeat"
        );
        self.heartbeats = self.heartbeats.saturating_add(1);
        self.spawned = 0;
        self.faults = 0;
        self.stuck = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_types::{EmergencyId, EngineId};

    fn summary(tick: u64) -> TickSummary {
        TickSummary {
            tick,
            ..TickSummary::default()
        }
    }

    #[test]
    fn heartbeat_only_on_interval() {
        let mut callback = LogCallback::new();
        for tick in 1..HEARTBEAT_TICKS {
            callback.on_tick(&summary(tick));
        }
        assert_eq!(callback.heartbeats(), 0);
        callback.on_tick(&summary(HEARTBEAT_TICKS));
        assert_eq!(callback.heartbeats(), 1);
    }

    #[test]
    fn counters_reset_after_heartbeat() {
        let mut callback = LogCallback::new();
        let mut busy = summary(HEARTBEAT_TICKS.saturating_sub(1));
        busy.spawned = vec![EmergencyId(1), EmergencyId(2)];
        busy.faults = vec![EngineId::Routing];
        busy.stuck = 3;
        callback.on_tick(&busy);
        assert_eq!(callback.spawned, 2);
        assert_eq!(callback.faults, 1);
        assert_eq!(callback.stuck, 3);

        callback.on_tick(&summary(HEARTBEAT_TICKS));
        assert_eq!(callback.spawned, 0);
        assert_eq!(callback.faults, 0);
        assert_eq!(callback.stuck, 0);
    }
}
