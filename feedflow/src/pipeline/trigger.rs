//! Trigger events that start runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A request to start one run.
///
/// Overrides become the run's initial input. Two have meaning to the
/// production workers: `date` (the strip date) and `endpoint` (the liveness
/// URL). Anything else is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Correlation id reported with the run.
    pub correlation_id: String,
    /// Initial input fields.
    #[serde(flatten)]
    pub overrides: Map<String, Value>,
}

impl TriggerEvent {
    /// Creates a trigger with no overrides.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            overrides: Map::new(),
        }
    }

    /// Creates a trigger with a generated correlation id.
    #[must_use]
    pub fn scheduled() -> Self {
        Self::new(format!("scheduled-{}", Uuid::new_v4()))
    }

    /// Sets the strip date.
    #[must_use]
    pub fn with_date(self, date: NaiveDate) -> Self {
        self.with_field("date", Value::String(date.format("%Y-%m-%d").to_string()))
    }

    /// Overrides the liveness endpoint.
    #[must_use]
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.with_field("endpoint", Value::String(endpoint.into()))
    }

    /// Sets an arbitrary input field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }

    /// Returns the `date` override, if present and well formed.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.overrides
            .get("date")
            .and_then(Value::as_str)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
    }

    /// Returns the `endpoint` override, if present.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.overrides.get("endpoint").and_then(Value::as_str)
    }
}
