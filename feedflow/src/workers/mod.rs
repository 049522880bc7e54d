//! Worker capabilities invoked by pipeline steps.
//!
//! Every step names a [`Capability`]; a [`Worker`] maps a capability and the
//! run's context document to a JSON result or a classified [`TaskError`].

mod build;
#[cfg(feature = "http")]
mod fetch;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
mod ping;
mod store;

pub use build::{pub_date, render_rss, BuildOutput, BuildWorker, FeedItem};
#[cfg(feature = "http")]
pub use fetch::{Comic, FetchOutput, FetchWorker};
#[cfg(feature = "http")]
pub use ping::{PingOutput, PingWorker};
pub use store::{strip_key, ArtifactStore, InMemoryArtifactStore, LocalArtifactStore, Metadata, StoredObject};

#[cfg(feature = "http")]
use crate::config::FeedflowConfig;
#[cfg(feature = "http")]
use crate::errors::FeedflowError;
use crate::errors::TaskError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// The kinds of work a step can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Download the day's content into the artifact store.
    Fetch,
    /// Derive the feed from stored content.
    Build,
    /// Report liveness to the monitoring endpoint.
    Ping,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Build => write!(f, "build"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// Executes capabilities on behalf of the orchestrator.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Performs `capability` against the run's context document.
    async fn invoke(&self, capability: Capability, input: &Value) -> Result<Value, TaskError>;
}

#[async_trait]
impl<W: Worker + ?Sized> Worker for Arc<W> {
    async fn invoke(&self, capability: Capability, input: &Value) -> Result<Value, TaskError> {
        (**self).invoke(capability, input).await
    }
}

/// Reads `input.date` (`YYYY-MM-DD`), defaulting to today in UTC.
pub(crate) fn input_date(input: &Value) -> Result<NaiveDate, TaskError> {
    match input.get("date") {
        None | Some(Value::Null) => Ok(Utc::now().date_naive()),
        Some(Value::String(raw)) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| TaskError::permanent(format!("Invalid date '{raw}': {e}"))),
        Some(other) => Err(TaskError::permanent(format!("Invalid date: {other}"))),
    }
}

pub(crate) fn to_output<T: Serialize>(output: &T) -> Result<Value, TaskError> {
    serde_json::to_value(output)
        .map_err(|e| TaskError::permanent(format!("Failed to encode worker output: {e}")))
}

/// The production workers, one per capability.
#[cfg(feature = "http")]
#[derive(Clone)]
pub struct Workers {
    /// Handles [`Capability::Fetch`].
    pub fetch: FetchWorker,
    /// Handles [`Capability::Build`].
    pub build: BuildWorker,
    /// Handles [`Capability::Ping`].
    pub ping: PingWorker,
}

#[cfg(feature = "http")]
impl Workers {
    /// Wires the production workers over a directory-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid timeouts or if an HTTP client cannot be
    /// built.
    pub fn from_config(config: &FeedflowConfig) -> Result<Self, FeedflowError> {
        let store: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(
            config.storage.root.clone(),
            config.storage.public_base_url(),
        ));
        Self::with_store(config, store)
    }

    /// Wires the production workers over an arbitrary store.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid timeouts or if an HTTP client cannot be
    /// built.
    pub fn with_store(
        config: &FeedflowConfig,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, FeedflowError> {
        let fetch = FetchWorker::new(
            Arc::clone(&store),
            &config.source.base_url,
            &config.storage.strips_dir,
            &config.source.user_agent,
            config.source_timeout()?,
        )?;
        let build = BuildWorker::new(
            store,
            &config.storage.strips_dir,
            &config.storage.feed_path,
            config.feed.length,
        );
        let mut ping = PingWorker::new(
            config.heartbeat.endpoint.clone(),
            &config.heartbeat.user_agent,
            config.heartbeat_timeout()?,
        )?;
        if let Some(marker) = &config.heartbeat.expected_body {
            ping = ping.with_expected_body(marker);
        }
        Ok(Self { fetch, build, ping })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Worker for Workers {
    async fn invoke(&self, capability: Capability, input: &Value) -> Result<Value, TaskError> {
        match capability {
            Capability::Fetch => to_output(&self.fetch.fetch(input).await?),
            Capability::Build => to_output(&self.build.build(input).await?),
            Capability::Ping => to_output(&self.ping.ping(input).await?),
        }
    }
}
