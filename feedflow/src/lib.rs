//! # Feedflow
//!
//! A daily batch pipeline that fetches a comic strip, rebuilds an RSS feed of
//! recent strips, and reports liveness to a heartbeat monitor.
//!
//! Feedflow provides:
//!
//! - **Ordered steps**: fetch, build and ping run strictly in sequence
//! - **Bounded retries**: per-step retry policies with exponential backoff
//! - **Per-step timeouts**: an overrunning step fails with a timeout error
//! - **Run context**: each step's output is recorded under its result key
//! - **Cooperative cancellation**: checked between steps and during retry waits
//! - **Event-driven observability**: lifecycle events for every run and step
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use feedflow::prelude::*;
//!
//! let config = FeedflowConfig::load(None)?;
//! let orchestrator = config
//!     .pipeline_builder()?
//!     .build(Workers::from_config(&config)?)?;
//!
//! let result = orchestrator.run(TriggerEvent::new("manual"), &CancellationToken::new()).await;
//! assert!(result.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod scheduler;
pub mod testing;
pub mod workers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::FeedflowConfig;
    pub use crate::context::{RunContext, RunIdentity};
    pub use crate::core::{RunResult, RunStatus};
    pub use crate::errors::{
        ErrorClass, FeedflowError, OrchestrationError, RunFailure, TaskError, TriggerRejected,
    };
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{
        default_steps, Orchestrator, OverlapPolicy, PipelineBuilder, RetryPolicy, StepDefinition,
        TriggerEvent,
    };
    pub use crate::scheduler::{run_daily, DailySchedule};
    #[cfg(feature = "http")]
    pub use crate::workers::Workers;
    pub use crate::workers::{ArtifactStore, Capability, Worker};
}
