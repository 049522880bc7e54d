//! Single-invocation step execution.

use crate::context::RunContext;
use crate::errors::TaskError;
use crate::pipeline::StepDefinition;
use crate::workers::Worker;
use serde_json::Value;
use tracing::debug;

/// Invokes one step's capability under the step's timeout.
///
/// Exactly one invocation per call. Retrying is the orchestrator's job.
#[derive(Debug)]
pub struct StepExecutor<'w, W: ?Sized> {
    worker: &'w W,
}

impl<'w, W: Worker + ?Sized> StepExecutor<'w, W> {
    /// Creates an executor over a worker.
    #[must_use]
    pub const fn new(worker: &'w W) -> Self {
        Self { worker }
    }

    /// Executes `step` against the context.
    ///
    /// # Errors
    ///
    /// Returns the worker's failure, or `TaskError::Timeout` if the
    /// invocation outlives the step timeout.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        context: &RunContext,
    ) -> Result<Value, TaskError> {
        let input = context.document();
        debug!(
            step = %step.name,
            capability = %step.capability,
            timeout_ms = u64::try_from(step.timeout.as_millis()).unwrap_or(u64::MAX),
            "Invoking step"
        );

        match tokio::time::timeout(step.timeout, self.worker.invoke(step.capability, &input)).await
        {
            Ok(result) => result,
            Err(_) => Err(TaskError::timeout(step.timeout)),
        }
    }
}
