//! Error types for the feedflow pipeline.
//!
//! Worker failures are classified at the boundary into [`TaskError`] kinds.
//! The orchestrator only ever inspects the [`ErrorClass`] of a failure when
//! deciding whether to retry; everything that ends a run is reported through
//! [`RunFailure`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for feedflow operations.
#[derive(Debug, Error)]
pub enum FeedflowError {
    /// A worker invocation failed.
    #[error("{0}")]
    Task(#[from] TaskError),

    /// The pipeline definition is unusable.
    #[error("{0}")]
    Orchestration(#[from] OrchestrationError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Failure class used to match retry policies against errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected to succeed if retried (server errors, connection failures).
    Transient,
    /// No retry can resolve it (bad input, authorization, validation).
    Permanent,
    /// The invocation exceeded its timeout.
    Timeout,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Error returned by a single worker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// A failure expected to clear up on retry.
    #[error("Transient task failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
    },

    /// A failure no retry can resolve.
    #[error("Permanent task failure: {message}")]
    Permanent {
        /// What went wrong.
        message: String,
    },

    /// The invocation did not finish within the step timeout.
    #[error("Task timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

impl TaskError {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { .. } => ErrorClass::Transient,
            Self::Permanent { .. } => ErrorClass::Permanent,
            Self::Timeout { .. } => ErrorClass::Timeout,
        }
    }
}

/// Metadata about an orchestration error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "ORCH-001-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the step list cannot be orchestrated.
///
/// Never retried. A run that hits one ends `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct OrchestrationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// Optional contract error info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ContractErrorInfo>,
}

impl OrchestrationError {
    /// Creates a new orchestration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// The pipeline has no steps.
    #[must_use]
    pub fn empty_pipeline() -> Self {
        Self::new("Pipeline has no steps").with_error_info(
            ContractErrorInfo::new("ORCH-001-EMPTY", "Cannot run an empty pipeline")
                .with_fix_hint("Configure at least one step."),
        )
    }

    /// Two steps share a name.
    #[must_use]
    pub fn duplicate_step(name: &str) -> Self {
        Self::new(format!("Duplicate step name '{name}'"))
            .with_steps(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new("ORCH-002-DUPLICATE_NAME", "Step names must be unique")
                    .with_context_entry("step", name),
            )
    }

    /// Two steps write to the same result key.
    #[must_use]
    pub fn duplicate_result_key(key: &str, first: &str, second: &str) -> Self {
        Self::new(format!(
            "Steps '{first}' and '{second}' both write result key '{key}'"
        ))
        .with_steps(vec![first.to_string(), second.to_string()])
        .with_error_info(
            ContractErrorInfo::new("ORCH-003-DUPLICATE_KEY", "Result keys must be unique")
                .with_context_entry("result_key", key),
        )
    }

    /// A step carries an unusable retry policy.
    #[must_use]
    pub fn invalid_retry(step: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(format!("Step '{step}' has an invalid retry policy: {reason}"))
            .with_steps(vec![step.to_string()])
            .with_error_info(
                ContractErrorInfo::new("ORCH-004-INVALID_RETRY", reason)
                    .with_fix_hint(
                        "Retry only transient or timeout failures, with max_attempts >= 1 and a finite backoff_rate >= 1.0.",
                    ),
            )
    }

    /// A step has a zero timeout.
    #[must_use]
    pub fn invalid_timeout(step: &str) -> Self {
        Self::new(format!("Step '{step}' has a zero timeout"))
            .with_steps(vec![step.to_string()])
            .with_error_info(ContractErrorInfo::new(
                "ORCH-005-INVALID_TIMEOUT",
                "Step timeouts must be greater than zero",
            ))
    }

    /// A step output could not be merged into the run context.
    #[must_use]
    pub fn context_conflict(step: &str, err: &DataConflictError) -> Self {
        Self::new(format!("Step '{step}' output rejected: {err}"))
            .with_steps(vec![step.to_string()])
            .with_error_info(
                ContractErrorInfo::new("ORCH-006-CONTEXT", err.to_string())
                    .with_context_entry("result_key", err.key.clone()),
            )
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// The error carried by a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RunFailure {
    /// The failing step's last invocation error.
    #[error("{0}")]
    Task(TaskError),
    /// The pipeline definition could not be orchestrated.
    #[error("{0}")]
    Orchestration(OrchestrationError),
}

impl From<TaskError> for RunFailure {
    fn from(err: TaskError) -> Self {
        Self::Task(err)
    }
}

impl From<OrchestrationError> for RunFailure {
    fn from(err: OrchestrationError) -> Self {
        Self::Orchestration(err)
    }
}

/// Error raised when writing to an existing key in the run context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Data conflict: key '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error returned when a trigger arrives while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Trigger '{correlation_id}' rejected: pipeline '{pipeline}' already has a run in flight")]
pub struct TriggerRejected {
    /// The pipeline name.
    pub pipeline: String,
    /// Correlation id of the rejected trigger.
    pub correlation_id: String,
}

/// Errors raised by an artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key would escape the store's namespace.
    #[error("Invalid artifact key '{0}'")]
    InvalidKey(String),

    /// Reading or writing the object failed.
    #[error("Storage IO failed for '{key}': {source}")]
    Io {
        /// The object key.
        key: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An object's metadata sidecar is unreadable.
    #[error("Corrupt metadata for '{key}': {source}")]
    Metadata {
        /// The object key.
        key: String,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(_) => Self::permanent(err.to_string()),
            StoreError::Io { .. } | StoreError::Metadata { .. } => Self::transient(err.to_string()),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The path that failed.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
