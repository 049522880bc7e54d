//! The liveness ping.

use super::http::build_client;
use crate::errors::TaskError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Output of a successful ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingOutput {
    /// The endpoint that was pinged.
    pub endpoint: String,
    /// The response status code.
    pub status: u16,
}

/// Reports a completed run to a liveness monitor.
#[derive(Debug, Clone)]
pub struct PingWorker {
    client: Client,
    endpoint: Option<String>,
    expected_body: Option<String>,
}

impl PingWorker {
    /// Creates a ping worker. Redirects are never followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Option<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, TaskError> {
        Ok(Self {
            client: build_client(user_agent, timeout, false)?,
            endpoint,
            expected_body: None,
        })
    }

    /// Requires the response body to contain `marker`.
    #[must_use]
    pub fn with_expected_body(mut self, marker: impl Into<String>) -> Self {
        self.expected_body = Some(marker.into());
        self
    }

    /// Pings the endpoint named by `input.endpoint`, or the configured one.
    ///
    /// Any non-2xx status, any transport error and any body that lacks the
    /// expected marker is transient.
    ///
    /// # Errors
    ///
    /// Returns a permanent failure when no endpoint is known at all.
    pub async fn ping(&self, input: &Value) -> Result<PingOutput, TaskError> {
        let endpoint = input
            .get("endpoint")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .ok_or_else(|| TaskError::permanent("No heartbeat endpoint configured"))?;

        info!(endpoint = %endpoint, "Sending ping");

        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| TaskError::transient(format!("Ping to {endpoint} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskError::transient(format!("HTTP status not 2xx: {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TaskError::transient(format!("Reading ping response failed: {e}")))?;
        if let Some(marker) = &self.expected_body {
            if !body.contains(marker.as_str()) {
                return Err(TaskError::transient(format!(
                    "Unexpected ping response: expected '{marker}'"
                )));
            }
        }

        debug!(endpoint = %endpoint, status = status.as_u16(), "Ping acknowledged");
        Ok(PingOutput {
            endpoint,
            status: status.as_u16(),
        })
    }
}
