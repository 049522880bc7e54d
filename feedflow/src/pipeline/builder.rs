//! Pipeline builder with validation.

use super::orchestrator::{Orchestrator, OverlapPolicy};
use super::spec::{validate_steps, StepDefinition};
use crate::errors::OrchestrationError;
use crate::events::EventSink;
use crate::workers::Worker;
use std::sync::Arc;

/// Builder for creating validated orchestrators.
///
/// Steps are checked as they are added, so a builder never holds a list that
/// would be rejected at run start.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<StepDefinition>,
    overlap: OverlapPolicy,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            overlap: OverlapPolicy::default(),
            events: None,
        }
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step is invalid or repeats a name or result key.
    pub fn step(mut self, step: StepDefinition) -> Result<Self, OrchestrationError> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Appends a step in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the step is invalid or repeats a name or result key.
    pub fn add_step(&mut self, step: StepDefinition) -> Result<(), OrchestrationError> {
        step.validate()?;
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(OrchestrationError::duplicate_step(&step.name));
        }
        if let Some(existing) = self.steps.iter().find(|s| s.result_key == step.result_key) {
            return Err(OrchestrationError::duplicate_result_key(
                &step.result_key,
                &existing.name,
                &step.name,
            ));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Sets the overlap policy.
    #[must_use]
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap = policy;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if no steps were added.
    pub fn build<W: Worker>(self, worker: W) -> Result<Orchestrator<W>, OrchestrationError> {
        validate_steps(&self.steps)?;
        let mut orchestrator =
            Orchestrator::new(self.name, self.steps, worker).with_overlap_policy(self.overlap);
        if let Some(sink) = self.events {
            orchestrator = orchestrator.with_event_sink(sink);
        }
        Ok(orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedWorker;
    use crate::workers::Capability;

    #[test]
    fn test_builder_in_order() {
        let builder = PipelineBuilder::new("daily")
            .step(StepDefinition::new("GetStrip", Capability::Fetch, "strip"))
            .unwrap()
            .step(StepDefinition::new("GenFeed", Capability::Build, "feed"))
            .unwrap();

        assert_eq!(builder.name(), "daily");
        assert_eq!(builder.step_count(), 2);
        assert_eq!(builder.step_names(), vec!["GetStrip", "GenFeed"]);
    }

    #[test]
    fn test_builder_rejects_duplicate_name() {
        let err = PipelineBuilder::new("daily")
            .step(StepDefinition::new("A", Capability::Fetch, "a"))
            .unwrap()
            .step(StepDefinition::new("A", Capability::Ping, "b"))
            .unwrap_err();
        assert_eq!(err.code(), Some("ORCH-002-DUPLICATE_NAME"));
    }

    #[test]
    fn test_builder_rejects_duplicate_key() {
        let err = PipelineBuilder::new("daily")
            .step(StepDefinition::new("A", Capability::Fetch, "k"))
            .unwrap()
            .step(StepDefinition::new("B", Capability::Ping, "k"))
            .unwrap_err();
        assert_eq!(err.code(), Some("ORCH-003-DUPLICATE_KEY"));
    }

    #[test]
    fn test_build_empty_fails() {
        let err = PipelineBuilder::new("daily")
            .build(ScriptedWorker::new())
            .unwrap_err();
        assert_eq!(err.code(), Some("ORCH-001-EMPTY"));
    }

    #[test]
    fn test_build_carries_policy() {
        let orch = PipelineBuilder::new("daily")
            .with_overlap_policy(OverlapPolicy::Queue)
            .step(StepDefinition::new("A", Capability::Fetch, "a"))
            .unwrap()
            .build(ScriptedWorker::new())
            .unwrap();
        assert_eq!(orch.overlap_policy(), OverlapPolicy::Queue);
        assert_eq!(orch.name(), "daily");
    }
}
