//! Context management for pipeline runs.
//!
//! This module provides:
//! - The run identity
//! - The monotonically growing result context owned by one run

mod bags;
mod identity;

pub use bags::RunContext;
pub use identity::RunIdentity;
