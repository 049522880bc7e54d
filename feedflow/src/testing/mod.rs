//! Testing utilities for feedflow pipelines.
//!
//! This module provides:
//! - A scripted worker that replays outcomes and records invocations
//! - Assertions for run results

mod assertions;
mod mocks;

pub use assertions::{assert_context_contains, assert_failed_at, assert_status, assert_succeeded};
pub use mocks::{Invocation, ScriptedWorker};
