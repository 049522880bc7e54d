//! Lifecycle events for observability.
//!
//! The orchestrator reports every run and step transition to an injected
//! [`EventSink`]. Sinks are cheap to share behind an `Arc`.

mod sink;

pub use sink::{
    CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
};
