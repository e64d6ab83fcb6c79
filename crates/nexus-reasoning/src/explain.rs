//! Explainability recorder.
//!
//! Not a decision-maker: it renders a fixed-template explanation for
//! each [`ReasoningContext`] and keeps the most recent entries in a
//! ring buffer, evicting the oldest once capacity is exceeded.

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use nexus_types::{EngineId, ReasoningId, ReasoningLogEntry};

use crate::output::ReasoningContext;

/// Default number of retained entries.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded history of rendered reasoning entries.
#[derive(Debug, Clone)]
pub struct Explainer {
    capacity: usize,
    history: VecDeque<ReasoningLogEntry>,
    counts: BTreeMap<EngineId, u64>,
    total: u64,
}

impl Default for Explainer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Subject phrase used at the start of every explanation.
const fn lead(engine: EngineId) -> &'static str {
    match engine {
        EngineId::Routing => "Route planner",
        EngineId::Allocation => "Power allocator",
        EngineId::Rules => "Rule engine",
        EngineId::Probabilistic => "Event generator",
        EngineId::Planner => "Task planner",
        EngineId::Explainability => "Explainer",
    }
}

/// Clamp a confidence into `[0, 1]`, dropping non-finite values.
fn normalize_confidence(confidence: Option<f64>) -> Option<f64> {
    confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
}

/// Render the fixed-template explanation for a context.
pub fn render(context: &ReasoningContext) -> String {
    let mut text = format!("{} decided '{}'", lead(context.engine), context.decision);
    if !context.steps.is_empty() {
        text.push_str(": ");
        text.push_str(&context.steps.join("; "));
    }
    text.push('.');
    if let Some(c) = normalize_confidence(context.confidence) {
        text.push_str(&format!(" Confidence {:.0}%.", c * 100.0));
    }
    text
}

impl Explainer {
    /// Create a recorder retaining at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    /// Render and retain one entry, returning a copy of it.
    pub fn record(&mut self, tick: u64, context: ReasoningContext) -> ReasoningLogEntry {
        let explanation = render(&context);
        let entry = ReasoningLogEntry {
            id: ReasoningId::new(),
            tick,
            timestamp: Utc::now(),
            engine: context.engine,
            decision: context.decision,
            explanation,
            steps: context.steps,
            inputs: context.inputs,
            outputs: context.outputs,
            confidence: normalize_confidence(context.confidence),
        };
        let count = self.counts.entry(entry.engine).or_insert(0);
        *count = count.saturating_add(1);
        self.total = self.total.saturating_add(1);

        self.history.push_back(entry.clone());
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        entry
    }

    /// Up to `limit` entries, newest first, optionally for one engine.
    pub fn recent(&self, limit: usize, engine: Option<EngineId>) -> Vec<ReasoningLogEntry> {
        self.history
            .iter()
            .rev()
            .filter(|e| engine.is_none_or(|id| e.engine == id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Entries recorded per engine since the last clear.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|(engine, n)| (engine.as_str().to_owned(), *n))
            .collect()
    }

    /// Entries recorded since the last clear, including evicted ones.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all entries and counters.
    pub fn clear(&mut self) {
        self.history.clear();
        self.counts.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;

    fn ctx(engine: EngineId, decision: &str) -> ReasoningContext {
        ReasoningContext::new(engine, decision)
    }

    #[test]
    fn renders_fixed_template() {
        let c = ctx(EngineId::Routing, "route_found")
            .step("A* expanded 12 nodes")
            .step("path length 9")
            .confidence(1.0);
        assert_eq!(
            render(&c),
            "Route planner decided 'route_found': A* expanded 12 nodes; path length 9. Confidence 100%."
        );
        assert_eq!(render(&ctx(EngineId::Rules, "idle")), "Rule engine decided 'idle'.");
    }

    #[test]
    fn confidence_is_clamped() {
        let mut ex = Explainer::new(4);
        let e = ex.record(0, ctx(EngineId::Planner, "x").confidence(1.7));
        assert_eq!(e.confidence, Some(1.0));
        let e = ex.record(0, ctx(EngineId::Planner, "y").confidence(f64::NAN));
        assert_eq!(e.confidence, None);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut ex = Explainer::new(3);
        for i in 0..5 {
            ex.record(i, ctx(EngineId::Allocation, &format!("d{i}")));
        }
        assert_eq!(ex.len(), 3);
        assert_eq!(ex.total(), 5);
        let recent = ex.recent(10, None);
        let labels: Vec<_> = recent.iter().map(|e| e.decision.as_str()).collect();
        assert_eq!(labels, vec!["d4", "d3", "d2"]);
    }

    #[test]
    fn zero_capacity_keeps_latest_entry() {
        let mut ex = Explainer::new(0);
        ex.record(1, ctx(EngineId::Rules, "a"));
        ex.record(2, ctx(EngineId::Rules, "b"));
        assert_eq!(ex.len(), 1);
        assert_eq!(ex.recent(5, None)[0].decision, "b");
    }

    #[test]
    fn filters_by_engine_newest_first() {
        let mut ex = Explainer::new(10);
        ex.record(1, ctx(EngineId::Rules, "a"));
        ex.record(2, ctx(EngineId::Routing, "b"));
        ex.record(3, ctx(EngineId::Rules, "c"));
        let rules = ex.recent(5, Some(EngineId::Rules));
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].decision, "c");
        assert_eq!(ex.recent(1, None)[0].tick, 3);
        assert_eq!(ex.counts().get("rules"), Some(&2));
    }

    #[test]
    fn clear_resets_everything() {
        let mut ex = Explainer::new(10);
        ex.record(1, ctx(EngineId::Rules, "a"));
        ex.clear();
        assert!(ex.is_empty());
        assert_eq!(ex.total(), 0);
        assert!(ex.counts().is_empty());
    }
}
