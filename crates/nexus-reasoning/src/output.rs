//! What an engine hands back to the orchestrator.

use nexus_types::{EngineId, Event};
use serde_json::Value;

/// Raw material for one reasoning log entry. The explainability recorder
/// turns it into an immutable, rendered entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningContext {
    /// Engine that made the decision.
    pub engine: EngineId,
    /// Short decision label.
    pub decision: String,
    /// Ordered reasoning steps.
    pub steps: Vec<String>,
    /// Structured inputs.
    pub inputs: Option<Value>,
    /// Structured outputs.
    pub outputs: Option<Value>,
    /// Confidence in `[0, 1]`.
    pub confidence: Option<f64>,
}

impl ReasoningContext {
    /// Start a context for `engine` with a decision label.
    pub fn new(engine: EngineId, decision: impl Into<String>) -> Self {
        Self {
            engine,
            decision: decision.into(),
            steps: Vec::new(),
            inputs: None,
            outputs: None,
            confidence: None,
        }
    }

    /// Append a reasoning step.
    #[must_use]
    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Attach structured inputs.
    #[must_use]
    pub fn inputs(mut self, inputs: Value) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Attach structured outputs.
    #[must_use]
    pub fn outputs(mut self, outputs: Value) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Attach a confidence value.
    #[must_use]
    pub const fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Events and reasoning produced by one engine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    /// Events to append to the history and publish.
    pub events: Vec<Event>,
    /// Reasoning to hand to the explainability recorder.
    pub reasoning: Vec<ReasoningContext>,
}

impl EngineOutput {
    /// An empty output.
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            reasoning: Vec::new(),
        }
    }

    /// Add an event.
    pub fn event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Add a reasoning context.
    pub fn reason(&mut self, context: ReasoningContext) {
        self.reasoning.push(context);
    }

    /// Move everything from `other` into `self`.
    pub fn absorb(&mut self, other: Self) {
        self.events.extend(other.events);
        self.reasoning.extend(other.reasoning);
    }

    /// Whether nothing was produced.
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty() && self.reasoning.is_empty()
    }
}
