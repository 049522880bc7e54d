//! The run orchestrator.
//!
//! Drives the step list strictly in order for one run: each step is executed,
//! retried under its policy, and its output merged into the run context
//! before the next step starts. The orchestrator also guards against
//! overlapping runs of the same pipeline.

use super::executor::StepExecutor;
use super::retry::{RetryDecision, RetryState};
use super::spec::{validate_steps, StepDefinition};
use super::trigger::TriggerEvent;
use crate::cancellation::CancellationToken;
use crate::context::{RunContext, RunIdentity};
use crate::core::{Run, RunResult, RunStatus};
use crate::errors::{OrchestrationError, TaskError, TriggerRejected};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::workers::Worker;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What to do with a trigger that arrives while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Refuse the trigger with [`TriggerRejected`].
    #[default]
    Reject,
    /// Wait for the in-flight run, first come first served.
    Queue,
}

enum StepOutcome {
    Succeeded(Value),
    Failed(TaskError),
    Cancelled(String),
}

fn cancel_reason(cancel: &CancellationToken) -> String {
    cancel.reason().unwrap_or_else(|| "Cancelled".to_string())
}

/// Runs a fixed, ordered list of steps against a worker.
pub struct Orchestrator<W> {
    name: String,
    steps: Vec<StepDefinition>,
    worker: W,
    events: Arc<dyn EventSink>,
    overlap: OverlapPolicy,
    in_flight: Mutex<()>,
}

impl<W> std::fmt::Debug for Orchestrator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl<W: Worker> Orchestrator<W> {
    /// Creates an orchestrator.
    ///
    /// Steps are validated when each run starts, so an invalid list yields a
    /// failed run rather than a panic.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>, worker: W) -> Self {
        Self {
            name: name.into(),
            steps,
            worker,
            events: Arc::new(NoOpEventSink),
            overlap: OverlapPolicy::default(),
            in_flight: Mutex::new(()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the overlap policy.
    #[must_use]
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap = policy;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step list.
    #[must_use]
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Returns the overlap policy.
    #[must_use]
    pub const fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Returns the worker.
    #[must_use]
    pub const fn worker(&self) -> &W {
        &self.worker
    }

    /// Returns true while a triggered run holds the in-flight slot.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Validates the step list.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        validate_steps(&self.steps)
    }

    /// Starts a run, applying the overlap policy.
    ///
    /// # Errors
    ///
    /// Returns `TriggerRejected` under [`OverlapPolicy::Reject`] when another
    /// triggered run is in flight.
    pub async fn trigger(
        &self,
        event: TriggerEvent,
        cancel: &CancellationToken,
    ) -> Result<RunResult, TriggerRejected> {
        let _slot = match self.overlap {
            OverlapPolicy::Reject => {
                if let Ok(slot) = self.in_flight.try_lock() {
                    slot
                } else {
                    warn!(
                        pipeline = %self.name,
                        correlation_id = %event.correlation_id,
                        "Trigger rejected: run already in flight"
                    );
                    self.events
                        .emit(
                            PipelineEvent::new(EventKind::TriggerRejected, None, &event.correlation_id)
                                .with_data(json!({ "pipeline": self.name })),
                        )
                        .await;
                    return Err(TriggerRejected {
                        pipeline: self.name.clone(),
                        correlation_id: event.correlation_id,
                    });
                }
            }
            OverlapPolicy::Queue => {
                debug!(correlation_id = %event.correlation_id, "Waiting for in-flight run");
                self.in_flight.lock().await
            }
        };

        Ok(self.run(event, cancel).await)
    }

    /// Executes one run to a terminal status.
    ///
    /// Never fails: every outcome, including an invalid step list, is
    /// reported through the returned [`RunResult`].
    pub async fn run(&self, event: TriggerEvent, cancel: &CancellationToken) -> RunResult {
        let identity = RunIdentity::new(event.correlation_id);
        let span = info_span!(
            "run",
            pipeline = %self.name,
            run_id = %identity.run_id,
            correlation_id = %identity.correlation_id,
        );
        self.drive(identity, event.overrides, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        identity: RunIdentity,
        input: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> RunResult {
        let mut run = Run::new(identity);
        let mut context = RunContext::new(input);
        let mut retries = RetryState::new();

        info!(steps = self.steps.len(), "Run started");
        self.emit(
            &run,
            EventKind::RunStarted,
            None,
            json!({ "pipeline": self.name, "steps": self.steps.len() }),
        )
        .await;

        if let Err(err) = self.validate() {
            error!(error = %err, "Pipeline definition rejected");
            // The offending step is listed last; earlier entries are the
            // steps it collides with.
            run.fail(err.steps.last().cloned(), err.into());
            return self.finish(run, context, retries).await;
        }

        run.start();
        for step in &self.steps {
            if cancel.is_cancelled() {
                run.cancel(cancel_reason(cancel));
                break;
            }

            match self.execute_step(&run, step, &context, &mut retries, cancel).await {
                StepOutcome::Succeeded(output) => {
                    if let Err(conflict) = context.set(step.result_key.clone(), output) {
                        let err = OrchestrationError::context_conflict(&step.name, &conflict);
                        error!(step = %step.name, error = %err, "Step output rejected");
                        run.fail(Some(step.name.clone()), err.into());
                        break;
                    }
                    run.advance();
                }
                StepOutcome::Failed(err) => {
                    error!(step = %step.name, error = %err, "Step failed permanently");
                    run.fail(Some(step.name.clone()), err.into());
                    break;
                }
                StepOutcome::Cancelled(reason) => {
                    run.cancel(reason);
                    break;
                }
            }
        }
        run.succeed();

        self.finish(run, context, retries).await
    }

    async fn execute_step(
        &self,
        run: &Run,
        step: &StepDefinition,
        context: &RunContext,
        retries: &mut RetryState,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let executor = StepExecutor::new(&self.worker);

        loop {
            let attempt = retries.record_attempt(&step.name);
            debug!(step = %step.name, attempt, "Step started");
            self.emit(run, EventKind::StepStarted, Some(&step.name), json!({ "attempt": attempt }))
                .await;

            let err = match executor.execute(step, context).await {
                Ok(output) => {
                    info!(step = %step.name, attempt, "Step succeeded");
                    self.emit(
                        run,
                        EventKind::StepSucceeded,
                        Some(&step.name),
                        json!({ "attempt": attempt, "result_key": step.result_key }),
                    )
                    .await;
                    return StepOutcome::Succeeded(output);
                }
                Err(err) => err,
            };

            self.emit(
                run,
                EventKind::StepFailed,
                Some(&step.name),
                json!({ "attempt": attempt, "class": err.class(), "error": err.to_string() }),
            )
            .await;

            let delay = match step.retry.decide(attempt, &err) {
                RetryDecision::Retry(delay) => delay,
                RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                    return StepOutcome::Failed(err);
                }
            };

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(step = %step.name, attempt, delay_ms, error = %err, "Retrying step");
            self.emit(
                run,
                EventKind::StepRetryScheduled,
                Some(&step.name),
                json!({ "attempt": attempt, "delay_ms": delay_ms }),
            )
            .await;

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    info!(step = %step.name, "Retry wait cancelled");
                    return StepOutcome::Cancelled(cancel_reason(cancel));
                }
            }
            if cancel.is_cancelled() {
                return StepOutcome::Cancelled(cancel_reason(cancel));
            }
        }
    }

    async fn finish(&self, run: Run, context: RunContext, retries: RetryState) -> RunResult {
        let result = run.finish(&self.name, context, retries.into_counts());

        let kind = match result.status {
            RunStatus::Succeeded => EventKind::RunSucceeded,
            RunStatus::Cancelled => EventKind::RunCancelled,
            RunStatus::Failed | RunStatus::Pending | RunStatus::Running => EventKind::RunFailed,
        };
        info!(
            status = %result.status,
            failed_step = result.failed_step.as_deref().unwrap_or(""),
            duration_ms = result.duration_ms,
            "Run finished"
        );
        self.events
            .emit(
                PipelineEvent::new(kind, Some(result.run_id), &result.correlation_id).with_data(
                    json!({
                        "status": result.status,
                        "failed_step": result.failed_step,
                        "error": result.error.as_ref().map(ToString::to_string),
                        "cancel_reason": result.cancel_reason,
                        "duration_ms": result.duration_ms,
                    }),
                ),
            )
            .await;

        result
    }

    async fn emit(&self, run: &Run, kind: EventKind, step: Option<&str>, data: Value) {
        let identity = run.identity();
        let mut event = PipelineEvent::new(kind, Some(identity.run_id), &identity.correlation_id)
            .with_data(data);
        if let Some(step) = step {
            event = event.with_step(step);
        }
        self.events.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedWorker;
    use crate::workers::Capability;
    use pretty_assertions::assert_eq;

    fn orchestrator(steps: Vec<StepDefinition>) -> Orchestrator<ScriptedWorker> {
        Orchestrator::new("test", steps, ScriptedWorker::new())
    }

    #[test]
    fn test_overlap_policy_default_and_serde() {
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Reject);
        let parsed: OverlapPolicy = serde_json::from_value(json!("queue")).unwrap();
        assert_eq!(parsed, OverlapPolicy::Queue);
    }

    #[test]
    fn test_builder_methods() {
        let orch = orchestrator(crate::pipeline::default_steps())
            .with_overlap_policy(OverlapPolicy::Queue);
        assert_eq!(orch.name(), "test");
        assert_eq!(orch.steps().len(), 3);
        assert_eq!(orch.overlap_policy(), OverlapPolicy::Queue);
        assert!(!orch.is_running());
        assert!(orch.validate().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_definition_fails_at_offending_step() {
        let steps = vec![
            StepDefinition::new("A", Capability::Fetch, "a"),
            StepDefinition::new("B", Capability::Build, "b")
                .with_timeout(std::time::Duration::ZERO),
        ];
        let orch = orchestrator(steps);

        let result = orch.run(TriggerEvent::new("t"), &CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.failed_step.as_deref(), Some("B"));
        assert!(orch.worker().calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orch = orchestrator(crate::pipeline::default_steps());
        let cancel = CancellationToken::new();
        cancel.cancel("shutdown");

        let result = orch.run(TriggerEvent::new("t"), &cancel).await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.cancel_reason.as_deref(), Some("shutdown"));
        assert!(orch.worker().calls().is_empty());
    }
}
