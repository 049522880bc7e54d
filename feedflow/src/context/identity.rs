//! Run identity for tracking pipeline executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one run and ties it back to the trigger that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,
    /// Correlation id carried by the trigger event.
    pub correlation_id: String,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            correlation_id: correlation_id.into(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_generates_unique_run_ids() {
        let a = RunIdentity::new("cron");
        let b = RunIdentity::new("cron");

        assert_eq!(a.correlation_id, "cron");
        assert_ne!(a.run_id, b.run_id);
    }
}
