//! Core domain model types for feedflow.
//!
//! This module contains:
//! - The run status enum
//! - The run record and the terminal run result

mod run;
mod status;

pub use run::{Run, RunResult};
pub use status::RunStatus;
