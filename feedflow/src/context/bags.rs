//! The per-run result context.

use crate::errors::DataConflictError;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Accumulates step outputs for exactly one run.
///
/// The context holds the run's initial input and one result per completed
/// step, keyed by the step's result key. It only grows: writing an existing
/// key returns a `DataConflictError`.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    input: Map<String, Value>,
    results: IndexMap<String, Value>,
}

impl RunContext {
    /// Creates a context seeded with the run's initial input.
    #[must_use]
    pub fn new(input: Map<String, Value>) -> Self {
        Self {
            input,
            results: IndexMap::new(),
        }
    }

    /// Returns the initial input.
    #[must_use]
    pub const fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Gets a step result by result key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    /// Checks if a result key has been written.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.results.contains_key(key)
    }

    /// Records a step result.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<(), DataConflictError> {
        let key = key.into();
        if self.results.contains_key(&key) {
            return Err(DataConflictError::new(key));
        }
        self.results.insert(key, value);
        Ok(())
    }

    /// Returns the number of step results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if no step has produced a result yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the result keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.results.keys().cloned().collect()
    }

    /// Renders the context as the JSON document handed to workers.
    ///
    /// Input fields sit at the top level and each result is nested under its
    /// result key. A result key shadows an input field of the same name.
    #[must_use]
    pub fn document(&self) -> Value {
        let mut doc = self.input.clone();
        for (key, value) in &self.results {
            doc.insert(key.clone(), value.clone());
        }
        Value::Object(doc)
    }

    /// Consumes the context, returning the step results.
    #[must_use]
    pub fn into_results(self) -> IndexMap<String, Value> {
        self.results
    }
}
