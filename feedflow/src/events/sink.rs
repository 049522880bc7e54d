//! Event sink trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// Kinds of lifecycle events emitted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// A run was created.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A step invocation began.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step produced a result.
    #[serde(rename = "step.succeeded")]
    StepSucceeded,
    /// A step invocation failed.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// A failed step will be invoked again after a delay.
    #[serde(rename = "step.retry_scheduled")]
    StepRetryScheduled,
    /// The run reached `Succeeded`.
    #[serde(rename = "run.succeeded")]
    RunSucceeded,
    /// The run reached `Failed`.
    #[serde(rename = "run.failed")]
    RunFailed,
    /// The run reached `Cancelled`.
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    /// A trigger was refused by the overlap policy.
    #[serde(rename = "trigger.rejected")]
    TriggerRejected,
}

impl EventKind {
    /// Returns the dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::StepStarted => "step.started",
            Self::StepSucceeded => "step.succeeded",
            Self::StepFailed => "step.failed",
            Self::StepRetryScheduled => "step.retry_scheduled",
            Self::RunSucceeded => "run.succeeded",
            Self::RunFailed => "run.failed",
            Self::RunCancelled => "run.cancelled",
            Self::TriggerRejected => "trigger.rejected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// The run this event belongs to. `None` for rejected triggers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Correlation id of the trigger.
    pub correlation_id: String,
    /// The step involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Event-specific payload.
    pub data: Value,
    /// Emission time.
    pub at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(kind: EventKind, run_id: Option<Uuid>, correlation_id: impl Into<String>) -> Self {
        Self {
            kind,
            run_id,
            correlation_id: correlation_id.into(),
            step: None,
            data: Value::Null,
            at: Utc::now(),
        }
    }

    /// Sets the step.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Trait for event sinks that can receive events.
///
/// The orchestrator emits run and step lifecycle events through this seam.
/// Implementations must not fail; a broken sink never affects a run.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &PipelineEvent) {
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        let step = event.step.as_deref().unwrap_or("");
        if self.level == Level::DEBUG {
            debug!(
                event = %event.kind,
                run_id = %run_id,
                correlation_id = %event.correlation_id,
                step = %step,
                data = %event.data,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event = %event.kind,
                run_id = %run_id,
                correlation_id = %event.correlation_id,
                step = %step,
                data = %event.data,
                "Event: {}", event.kind
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event kinds in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: EventKind) -> PipelineEvent {
        PipelineEvent::new(kind, Some(Uuid::new_v4()), "corr")
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::StepRetryScheduled.as_str(), "step.retry_scheduled");
        assert_eq!(
            serde_json::to_value(EventKind::RunCancelled).unwrap(),
            json!("run.cancelled")
        );
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit(event(EventKind::RunStarted)).await;
        sink.emit(event(EventKind::RunFailed)).await;
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit(event(EventKind::StepStarted).with_step("GetStrip")).await;
        sink.emit(event(EventKind::TriggerRejected).with_data(json!({"pipeline": "daily"}))).await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(event(EventKind::RunStarted)).await;
        sink.emit(event(EventKind::StepStarted).with_step("GenFeed")).await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.kinds(), vec![EventKind::RunStarted, EventKind::StepStarted]);
        assert_eq!(sink.events()[1].step.as_deref(), Some("GenFeed"));
    }

    #[tokio::test]
    async fn test_collecting_sink_filter_and_clear() {
        let sink = CollectingEventSink::new();
        sink.emit(event(EventKind::StepFailed)).await;
        sink.emit(event(EventKind::StepRetryScheduled)).await;
        sink.emit(event(EventKind::StepFailed)).await;

        assert_eq!(sink.events_of_kind(EventKind::StepFailed).len(), 2);

        sink.clear();
        assert!(sink.is_empty());
    }
}
