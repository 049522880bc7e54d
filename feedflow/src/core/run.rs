//! The run record and its terminal result.

use super::RunStatus;
use crate::context::{RunContext, RunIdentity};
use crate::errors::RunFailure;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution of the step sequence.
///
/// Status moves `Pending -> Running -> {Succeeded, Failed, Cancelled}`; the
/// first terminal status wins and later transitions are ignored.
#[derive(Debug)]
pub struct Run {
    identity: RunIdentity,
    status: RunStatus,
    step_index: usize,
    failed_step: Option<String>,
    error: Option<RunFailure>,
    cancel_reason: Option<String>,
}

impl Run {
    /// Creates a pending run.
    #[must_use]
    pub const fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            status: RunStatus::Pending,
            step_index: 0,
            failed_step: None,
            error: None,
            cancel_reason: None,
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub const fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the index of the step currently executing.
    #[must_use]
    pub const fn step_index(&self) -> usize {
        self.step_index
    }

    /// Marks the run as running.
    pub fn start(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
        }
    }

    /// Moves on to the next step.
    pub fn advance(&mut self) {
        self.step_index += 1;
    }

    /// Marks the run as succeeded.
    pub fn succeed(&mut self) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Succeeded;
        }
    }

    /// Marks the run as failed.
    pub fn fail(&mut self, step: Option<String>, error: RunFailure) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Failed;
            self.failed_step = step;
            self.error = Some(error);
        }
    }

    /// Marks the run as cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = RunStatus::Cancelled;
            self.cancel_reason = Some(reason.into());
        }
    }

    /// Consumes the run and its context into the reported result.
    #[must_use]
    pub fn finish(
        self,
        pipeline: impl Into<String>,
        context: RunContext,
        attempts: IndexMap<String, u32>,
    ) -> RunResult {
        let ended_at = Utc::now();
        #[allow(clippy::cast_precision_loss)]
        let duration_ms = (ended_at - self.identity.started_at).num_milliseconds() as f64;

        RunResult {
            run_id: self.identity.run_id,
            correlation_id: self.identity.correlation_id,
            pipeline: pipeline.into(),
            status: self.status,
            context: context.into_results(),
            failed_step: self.failed_step,
            error: self.error,
            cancel_reason: self.cancel_reason,
            attempts,
            started_at: self.identity.started_at,
            ended_at,
            duration_ms,
        }
    }
}

/// Terminal outcome of a run, returned to whatever triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The run id.
    pub run_id: Uuid,
    /// Correlation id from the trigger.
    pub correlation_id: String,
    /// The pipeline name.
    pub pipeline: String,
    /// Terminal status.
    pub status: RunStatus,
    /// Step outputs keyed by result key, in execution order.
    pub context: IndexMap<String, serde_json::Value>,
    /// The step that failed, if the run failed at a step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Why the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    /// Why the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// Invocation attempts per step name.
    pub attempts: IndexMap<String, u32>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached its terminal status.
    pub ended_at: DateTime<Utc>,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl RunResult {
    /// Returns true if the run succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns how many times a step was invoked (0 if never).
    #[must_use]
    pub fn attempts_for(&self, step: &str) -> u32 {
        self.attempts.get(step).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskError;
    use pretty_assertions::assert_eq;

    fn run() -> Run {
        Run::new(RunIdentity::new("test"))
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = run();
        assert_eq!(run.status(), RunStatus::Pending);

        run.start();
        assert_eq!(run.status(), RunStatus::Running);

        run.advance();
        assert_eq!(run.step_index(), 1);

        run.succeed();
        assert_eq!(run.status(), RunStatus::Succeeded);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut run = run();
        run.start();
        run.fail(Some("Build".to_string()), TaskError::permanent("bad").into());
        run.cancel("too late");
        run.succeed();

        assert_eq!(run.status(), RunStatus::Failed);
        let result = run.finish("feed", RunContext::default(), IndexMap::new());
        assert_eq!(result.failed_step.as_deref(), Some("Build"));
        assert!(result.cancel_reason.is_none());
    }

    #[test]
    fn test_finish_carries_identity() {
        let mut run = run();
        let run_id = run.identity().run_id;
        run.start();
        run.cancel("budget exceeded");

        let mut attempts = IndexMap::new();
        attempts.insert("GetStrip".to_string(), 2);

        let result = run.finish("feed", RunContext::default(), attempts);
        assert_eq!(result.run_id, run_id);
        assert_eq!(result.correlation_id, "test");
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.cancel_reason.as_deref(), Some("budget exceeded"));
        assert_eq!(result.attempts_for("GetStrip"), 2);
        assert_eq!(result.attempts_for("GenFeed"), 0);
        assert!(result.duration_ms >= 0.0);
    }

    #[test]
    fn test_run_result_serialization_skips_empty_failure() {
        let mut run = run();
        run.start();
        run.succeed();
        let result = run.finish("feed", RunContext::default(), IndexMap::new());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("failed_step").is_none());
        assert!(json.get("error").is_none());
    }
}
