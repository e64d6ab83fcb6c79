//! Reasoning engines for the Nexus city simulation.
//!
//! Each engine takes a slice of world state and returns an
//! [`EngineOutput`]: events for the history and [`ReasoningContext`]s for
//! the explainability recorder. None of them own the world; the
//! orchestrator in `nexus-core` calls them in a fixed order every tick.
//!
//! # Modules
//!
//! - [`allocation`] -- Three-phase constraint power allocation.
//! - [`error`] -- [`EngineError`], the internal fault type.
//! - [`explain`] -- [`Explainer`]: bounded reasoning history and rendering.
//! - [`output`] -- [`EngineOutput`] and [`ReasoningContext`].
//! - [`planner`] -- HTN emergency-response planner.
//! - [`probability`] -- Accident and fire likelihood model.
//! - [`rules`] -- Forward-chaining rule engine with cooldowns.

pub mod allocation;
pub mod error;
pub mod explain;
pub mod output;
pub mod planner;
pub mod probability;
pub mod rules;

pub use allocation::{Allocation, Demand, allocate, reallocate};
pub use error::EngineError;
pub use explain::Explainer;
pub use output::{EngineOutput, ReasoningContext};
pub use planner::{Plan, PlanStatus, PlanWorld, Planner};
pub use probability::{Assessment, EventGenerator, ProbabilityParams};
pub use rules::{CityContext, Rule, RuleContext, RuleEngine, default_rules};
