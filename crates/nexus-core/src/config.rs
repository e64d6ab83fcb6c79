//! Configuration loading and typed config structures for the Nexus simulation.
//!
//! The canonical configuration lives in `nexus-config.yaml` at the project
//! root. Every field has a serde default, so an empty file (or no file at
//! all) yields the stock 20x20 city.

use std::path::Path;

use serde::Deserialize;

/// Largest accepted grid side. The city is allocated eagerly.
pub const MAX_GRID_SIZE: u32 = 1000;

/// Largest accepted per-subscriber bus buffer.
pub const MAX_BUS_CAPACITY: usize = 65_536;

/// Largest accepted event or reasoning history.
pub const MAX_HISTORY_CAPACITY: usize = 1_000_000;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `nexus-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Grid, seed and pacing.
    #[serde(default)]
    pub world: WorldConfig,

    /// Vehicle counts and wandering.
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Power budget and reallocation cadence.
    #[serde(default)]
    pub power: PowerConfig,

    /// Emergency likelihood model.
    #[serde(default)]
    pub probability: ProbabilityConfig,

    /// Rule evaluation cadence and debounce.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Retained history sizes.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Outbound bus sizing.
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `NEXUS_SEED` overrides `world.seed`
    /// - `NEXUS_GRID_SIZE` overrides `world.grid_size`
    /// - `NEXUS_TICK_INTERVAL_MS` overrides `world.tick_interval_ms`
    /// - `NEXUS_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with `NEXUS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but does not
    /// parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(seed) = env_number("NEXUS_SEED", "world.seed")? {
            self.world.seed = seed;
        }
        if let Some(size) = env_number("NEXUS_GRID_SIZE", "world.grid_size")? {
            self.world.grid_size = size;
        }
        if let Some(ms) = env_number("NEXUS_TICK_INTERVAL_MS", "world.tick_interval_ms")? {
            self.world.tick_interval_ms = ms;
        }
        if let Ok(level) = std::env::var("NEXUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Reject values the simulation cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=MAX_GRID_SIZE).contains(&self.world.grid_size) {
            return Err(invalid(
                "world.grid_size",
                format!("must be between 2 and {MAX_GRID_SIZE}"),
            ));
        }
        if self.world.tick_interval_ms == 0 {
            return Err(invalid("world.tick_interval_ms", "must be positive"));
        }
        if self.power.reallocation_interval_ticks == 0 {
            return Err(invalid("power.reallocation_interval_ticks", "must be positive"));
        }
        if self.rules.evaluation_interval_ticks == 0 {
            return Err(invalid("rules.evaluation_interval_ticks", "must be positive"));
        }
        for (field, value, max) in [
            ("history.event_capacity", self.history.event_capacity, MAX_HISTORY_CAPACITY),
            ("history.reasoning_capacity", self.history.reasoning_capacity, MAX_HISTORY_CAPACITY),
            ("bus.capacity", self.bus.capacity, MAX_BUS_CAPACITY),
        ] {
            if !(1..=max).contains(&value) {
                return Err(invalid(field, format!("must be between 1 and {max}")));
            }
        }
        for (field, value) in [
            ("fleet.wander_probability", self.fleet.wander_probability),
            ("probability.accident_base_rate", self.probability.accident_base_rate),
            ("probability.fire_base_rate", self.probability.fire_base_rate),
            ("probability.accident_cap", self.probability.accident_cap),
            ("probability.fire_cap", self.probability.fire_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{value} is outside [0, 1]")));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn env_number<T: std::str::FromStr>(var: &str, field: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_e| invalid(field, format!("{var}={raw} is not a number"))),
        Err(_) => Ok(None),
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Side length of the square grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// Random seed for city generation, wandering and spawning.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Fleet configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FleetConfig {
    /// Civilian vehicles.
    #[serde(default = "default_normal_vehicles")]
    pub normal_vehicles: u32,

    /// Emergency responders, alternating ambulance and fire truck.
    #[serde(default = "default_emergency_vehicles")]
    pub emergency_vehicles: u32,

    /// Per-tick chance that an idle civilian picks a new destination.
    #[serde(default = "default_wander_probability")]
    pub wander_probability: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            normal_vehicles: default_normal_vehicles(),
            emergency_vehicles: default_emergency_vehicles(),
            wander_probability: default_wander_probability(),
        }
    }
}

/// Power grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PowerConfig {
    /// Total power units available.
    #[serde(default = "default_total_capacity")]
    pub total_capacity: u32,

    /// Run the allocator every N ticks.
    #[serde(default = "default_reallocation_interval_ticks")]
    pub reallocation_interval_ticks: u64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            total_capacity: default_total_capacity(),
            reallocation_interval_ticks: default_reallocation_interval_ticks(),
        }
    }
}

/// Emergency likelihood configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbabilityConfig {
    /// Per-tick base accident probability.
    #[serde(default = "default_accident_base_rate")]
    pub accident_base_rate: f64,

    /// Per-tick base fire probability.
    #[serde(default = "default_fire_base_rate")]
    pub fire_base_rate: f64,

    /// Upper bound on the accident probability.
    #[serde(default = "default_accident_cap")]
    pub accident_cap: f64,

    /// Upper bound on the fire probability.
    #[serde(default = "default_fire_cap")]
    pub fire_cap: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            accident_base_rate: default_accident_base_rate(),
            fire_base_rate: default_fire_base_rate(),
            accident_cap: default_accident_cap(),
            fire_cap: default_fire_cap(),
        }
    }
}

/// Rule engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RulesConfig {
    /// Evaluate rules every N ticks.
    #[serde(default = "default_evaluation_interval_ticks")]
    pub evaluation_interval_ticks: u64,

    /// Minimum ticks between firings of the same rule on the same
    /// subject. Zero re-fires every cycle.
    #[serde(default)]
    pub cooldown_ticks: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ticks: default_evaluation_interval_ticks(),
            cooldown_ticks: 0,
        }
    }
}

/// History retention configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Events kept for `get_events`.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Reasoning entries kept for `get_reasoning`.
    #[serde(default = "default_reasoning_capacity")]
    pub reasoning_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            reasoning_capacity: default_reasoning_capacity(),
        }
    }
}

/// Outbound bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// Notifications buffered per subscriber before the oldest are dropped.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

const fn default_grid_size() -> u32 {
    20
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    83
}

const fn default_normal_vehicles() -> u32 {
    8
}

const fn default_emergency_vehicles() -> u32 {
    2
}

const fn default_wander_probability() -> f64 {
    0.1
}

const fn default_total_capacity() -> u32 {
    1000
}

const fn default_reallocation_interval_ticks() -> u64 {
    20
}

const fn default_accident_base_rate() -> f64 {
    0.02
}

const fn default_fire_base_rate() -> f64 {
    0.01
}

const fn default_accident_cap() -> f64 {
    0.75
}

const fn default_fire_cap() -> f64 {
    0.5
}

const fn default_evaluation_interval_ticks() -> u64 {
    1
}

const fn default_event_capacity() -> usize {
    500
}

const fn default_reasoning_capacity() -> usize {
    1000
}

const fn default_bus_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    String::from("info")
}
