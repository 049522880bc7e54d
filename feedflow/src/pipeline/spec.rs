//! Step definitions.

use crate::errors::OrchestrationError;
use crate::pipeline::RetryPolicy;
use crate::workers::Capability;
use std::time::Duration;

/// Default per-invocation timeout.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// One step of the pipeline. Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    /// The unique name of the step.
    pub name: String,
    /// The worker capability this step invokes.
    pub capability: Capability,
    /// Context key the step's output is written under.
    pub result_key: String,
    /// Retry behavior on failure.
    pub retry: RetryPolicy,
    /// Timeout for a single invocation.
    pub timeout: Duration,
}

impl StepDefinition {
    /// Creates a step with the default retry policy and timeout.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capability: Capability,
        result_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            capability,
            result_key: result_key.into(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates this step in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid retry policy or a zero timeout.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        self.retry
            .validate()
            .map_err(|reason| OrchestrationError::invalid_retry(&self.name, reason))?;
        if self.timeout.is_zero() {
            return Err(OrchestrationError::invalid_timeout(&self.name));
        }
        Ok(())
    }
}

/// The daily fetch, build, ping sequence with default policies.
#[must_use]
pub fn default_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("GetStrip", Capability::Fetch, "strip"),
        StepDefinition::new("GenFeed", Capability::Build, "feed"),
        StepDefinition::new("SendHeartbeat", Capability::Ping, "heartbeat"),
    ]
}

/// Validates an ordered step list.
///
/// # Errors
///
/// Returns an error if the list is empty, a name or result key repeats, or
/// any step fails [`StepDefinition::validate`].
pub fn validate_steps(steps: &[StepDefinition]) -> Result<(), OrchestrationError> {
    if steps.is_empty() {
        return Err(OrchestrationError::empty_pipeline());
    }

    for (i, step) in steps.iter().enumerate() {
        step.validate()?;
        for earlier in &steps[..i] {
            if earlier.name == step.name {
                return Err(OrchestrationError::duplicate_step(&step.name));
            }
            if earlier.result_key == step.result_key {
                return Err(OrchestrationError::duplicate_result_key(
                    &step.result_key,
                    &earlier.name,
                    &step.name,
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_definition_creation() {
        let step = StepDefinition::new("GetStrip", Capability::Fetch, "strip")
            .with_timeout(Duration::from_secs(3))
            .with_retry(RetryPolicy::none());

        assert_eq!(step.name, "GetStrip");
        assert_eq!(step.capability, Capability::Fetch);
        assert_eq!(step.result_key, "strip");
        assert_eq!(step.timeout, Duration::from_secs(3));
        assert_eq!(step.retry.max_attempts, 1);
    }

    #[test]
    fn test_default_steps_are_valid() {
        let steps = default_steps();
        assert_eq!(steps.len(), 3);
        assert!(validate_steps(&steps).is_ok());
    }

    #[test]
    fn test_empty_steps_rejected() {
        let err = validate_steps(&[]).unwrap_err();
        assert_eq!(err.code(), Some("ORCH-001-EMPTY"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let steps = vec![
            StepDefinition::new("A", Capability::Fetch, "a"),
            StepDefinition::new("A", Capability::Build, "b"),
        ];
        let err = validate_steps(&steps).unwrap_err();
        assert_eq!(err.code(), Some("ORCH-002-DUPLICATE_NAME"));
    }

    #[test]
    fn test_duplicate_result_key_rejected() {
        let steps = vec![
            StepDefinition::new("A", Capability::Fetch, "same"),
            StepDefinition::new("B", Capability::Build, "same"),
        ];
        let err = validate_steps(&steps).unwrap_err();
        assert_eq!(err.code(), Some("ORCH-003-DUPLICATE_KEY"));
        assert_eq!(err.steps, vec!["A", "B"]);
    }

    #[test]
    fn test_invalid_retry_rejected() {
        let step = StepDefinition::new("A", Capability::Ping, "a")
            .with_retry(RetryPolicy::default().with_max_attempts(0));
        let err = step.validate().unwrap_err();
        assert_eq!(err.code(), Some("ORCH-004-INVALID_RETRY"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let step = StepDefinition::new("A", Capability::Ping, "a").with_timeout(Duration::ZERO);
        let err = step.validate().unwrap_err();
        assert_eq!(err.code(), Some("ORCH-005-INVALID_TIMEOUT"));
    }
}
