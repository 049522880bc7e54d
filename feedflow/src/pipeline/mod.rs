//! Pipeline definition and execution.
//!
//! This module provides:
//! - Step definitions and their retry policies
//! - The single-invocation step executor
//! - The orchestrator that drives a run and applies the overlap policy
//! - A validating pipeline builder

mod builder;
mod executor;
mod orchestrator;
mod retry;
mod spec;
mod trigger;


pub use builder::PipelineBuilder;
pub use executor::StepExecutor;
pub use orchestrator::{Orchestrator, OverlapPolicy};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use spec::{default_steps, validate_steps, StepDefinition, DEFAULT_STEP_TIMEOUT};
pub use trigger::TriggerEvent;
