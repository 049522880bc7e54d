//! Scripted workers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::errors::TaskError;
use crate::workers::{Capability, Worker};

/// One scripted response.
#[derive(Debug, Clone)]
enum Script {
    Reply(Result<Value, TaskError>),
    Delay(Duration, Result<Value, TaskError>),
    Hang,
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The capability invoked.
    pub capability: Capability,
    /// The context document the worker received.
    pub input: Value,
    /// When the invocation started (tokio clock, so it honors paused time).
    pub at: tokio::time::Instant,
}

/// A worker that replays scripted outcomes per capability and records every
/// invocation.
///
/// Scripted outcomes are consumed in order. Once a capability's script runs
/// out it succeeds with `{"capability": "<name>"}`.
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    scripts: Mutex<HashMap<Capability, VecDeque<Script>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedWorker {
    /// Creates a worker that succeeds at everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, capability: Capability, script: Script) -> Self {
        self.scripts
            .lock()
            .entry(capability)
            .or_default()
            .push_back(script);
        self
    }

    /// Queues a success.
    #[must_use]
    pub fn succeed(self, capability: Capability, output: Value) -> Self {
        self.push(capability, Script::Reply(Ok(output)))
    }

    /// Queues a failure.
    #[must_use]
    pub fn fail(self, capability: Capability, error: TaskError) -> Self {
        self.push(capability, Script::Reply(Err(error)))
    }

    /// Queues the same failure `times` times.
    #[must_use]
    pub fn fail_times(mut self, capability: Capability, error: TaskError, times: usize) -> Self {
        for _ in 0..times {
            self = self.fail(capability, error.clone());
        }
        self
    }

    /// Queues a success delivered after `delay`.
    #[must_use]
    pub fn succeed_after(self, capability: Capability, delay: Duration, output: Value) -> Self {
        self.push(capability, Script::Delay(delay, Ok(output)))
    }

    /// Queues an invocation that never completes.
    #[must_use]
    pub fn hang(self, capability: Capability) -> Self {
        self.push(capability, Script::Hang)
    }

    /// Returns all recorded invocations.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Returns the capabilities invoked, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Capability> {
        self.invocations.lock().iter().map(|i| i.capability).collect()
    }

    /// Returns how many times a capability was invoked.
    #[must_use]
    pub fn call_count(&self, capability: Capability) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.capability == capability)
            .count()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, capability: Capability, input: &Value) -> Result<Value, TaskError> {
        self.invocations.lock().push(Invocation {
            capability,
            input: input.clone(),
            at: tokio::time::Instant::now(),
        });

        let script = self
            .scripts
            .lock()
            .get_mut(&capability)
            .and_then(VecDeque::pop_front);

        match script {
            Some(Script::Reply(result)) => result,
            Some(Script::Delay(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Script::Hang) => std::future::pending().await,
            None => Ok(json!({ "capability": capability.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_worker_replays_in_order() {
        let worker = ScriptedWorker::new()
            .fail(Capability::Fetch, TaskError::transient("not yet"))
            .succeed(Capability::Fetch, json!({"title": "t"}));

        let first = worker.invoke(Capability::Fetch, &json!({})).await;
        let second = worker.invoke(Capability::Fetch, &json!({})).await;
        let third = worker.invoke(Capability::Fetch, &json!({})).await;

        assert_eq!(first, Err(TaskError::transient("not yet")));
        assert_eq!(second, Ok(json!({"title": "t"})));
        assert_eq!(third, Ok(json!({"capability": "fetch"})));
        assert_eq!(worker.call_count(Capability::Fetch), 3);
    }

    #[tokio::test]
    async fn test_scripted_worker_records_input() {
        let worker = ScriptedWorker::new();
        worker
            .invoke(Capability::Ping, &json!({"endpoint": "http://x"}))
            .await
            .unwrap();

        let invocations = worker.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].input["endpoint"], "http://x");
        assert_eq!(worker.calls(), vec![Capability::Ping]);
    }

    #[tokio::test]
    async fn test_fail_times() {
        let worker = ScriptedWorker::new().fail_times(Capability::Build, TaskError::permanent("x"), 2);

        assert!(worker.invoke(Capability::Build, &json!({})).await.is_err());
        assert!(worker.invoke(Capability::Build, &json!({})).await.is_err());
        assert!(worker.invoke(Capability::Build, &json!({})).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeed_after_delay() {
        let worker = ScriptedWorker::new().succeed_after(
            Capability::Fetch,
            Duration::from_secs(5),
            json!(1),
        );

        let start = tokio::time::Instant::now();
        let out = worker.invoke(Capability::Fetch, &json!({})).await.unwrap();
        assert_eq!(out, json!(1));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
