//! Test assertions for run results.

use crate::core::{RunResult, RunStatus};
use crate::errors::{ErrorClass, RunFailure};

/// Asserts that the run succeeded.
pub fn assert_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "Expected success, got status {} (failed_step: {:?}, error: {:?})",
        result.status,
        result.failed_step,
        result.error
    );
}

/// Asserts that the run has the expected status.
pub fn assert_status(result: &RunResult, expected: RunStatus) {
    assert_eq!(
        result.status, expected,
        "Expected status {expected}, got {}",
        result.status
    );
}

/// Asserts that the run failed at `step` with a task error of `class`.
pub fn assert_failed_at(result: &RunResult, step: &str, class: ErrorClass) {
    assert_status(result, RunStatus::Failed);
    assert_eq!(
        result.failed_step.as_deref(),
        Some(step),
        "Expected failure at step '{step}'"
    );
    match &result.error {
        Some(RunFailure::Task(err)) => assert_eq!(
            err.class(),
            class,
            "Expected a {class} failure, got {err}"
        ),
        other => panic!("Expected a task failure, got {other:?}"),
    }
}

/// Asserts that a result key is present in the run context.
pub fn assert_context_contains(result: &RunResult, key: &str) {
    assert!(
        result.context.contains_key(key),
        "Expected context to contain key '{key}'. Keys: {:?}",
        result.context.keys().collect::<Vec<_>>()
    );
}
