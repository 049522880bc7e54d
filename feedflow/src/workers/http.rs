//! HTTP client construction and failure classification.

use crate::errors::TaskError;
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;

/// Builds a client with a fixed user agent and request timeout.
///
/// # Errors
///
/// Returns a permanent failure if the TLS backend cannot be initialized.
pub fn build_client(
    user_agent: &str,
    timeout: Duration,
    follow_redirects: bool,
) -> Result<Client, TaskError> {
    let policy = if follow_redirects {
        redirect::Policy::limited(10)
    } else {
        redirect::Policy::none()
    };
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(|e| TaskError::permanent(format!("Failed to build HTTP client: {e}")))
}

/// Classifies a non-success status code.
///
/// Server errors, 408 and 429 may clear up on their own; every other client
/// error will not.
#[must_use]
pub fn classify_status(status: StatusCode, url: &str) -> TaskError {
    let message = format!("HTTP status not 2xx: {status} from {url}");
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        TaskError::transient(message)
    } else {
        TaskError::permanent(message)
    }
}

/// Classifies a transport-level error.
#[must_use]
pub fn classify_error(err: &reqwest::Error, timeout: Duration) -> TaskError {
    if err.is_timeout() {
        TaskError::timeout(timeout)
    } else if err.is_builder() {
        TaskError::permanent(format!("Invalid request: {err}"))
    } else if let Some(status) = err.status() {
        classify_status(status, err.url().map_or("", reqwest::Url::as_str))
    } else {
        TaskError::transient(format!("Request failed: {err}"))
    }
}

/// Sends a GET and returns the response if its status is 2xx.
///
/// # Errors
///
/// Returns the classified failure for transport errors and non-2xx statuses.
pub async fn get_success(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Response, TaskError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(&e, timeout))?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(classify_status(status, url))
    }
}
