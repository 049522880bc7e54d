//! Static configuration.
//!
//! Configuration is loaded once at process start from an optional TOML file,
//! then environment overrides are applied. Every field has a default, so an
//! empty file (or none at all) yields the standard daily pipeline.

use crate::errors::{ConfigError, ErrorClass, FeedflowError, OrchestrationError};
use crate::pipeline::{OverlapPolicy, PipelineBuilder, RetryPolicy, StepDefinition};
use crate::scheduler::DailySchedule;
use crate::workers::Capability;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `storage.root`.
pub const ENV_STORAGE_ROOT: &str = "FEEDFLOW_STORAGE_ROOT";
/// Environment variable overriding `storage.public_base_url`.
pub const ENV_PUBLIC_BASE_URL: &str = "FEEDFLOW_PUBLIC_BASE_URL";
/// Environment variable overriding `storage.strips_dir`.
pub const ENV_STRIPS_DIR: &str = "STRIPS_DIR";
/// Environment variable overriding `storage.feed_path`.
pub const ENV_FEED_PATH: &str = "FEED_PATH";
/// Environment variable overriding `heartbeat.endpoint`.
pub const ENV_HEARTBEAT_ENDPOINT: &str = "HEARTBEAT_ENDPOINT";
/// Environment variable overriding `source.base_url`.
pub const ENV_SOURCE_URL: &str = "FEEDFLOW_SOURCE_URL";

fn seconds(key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigError::invalid(key, format!("{value} is not a valid number of seconds")))
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedflowConfig {
    /// Pipeline identity and overlap handling.
    pub pipeline: PipelineConfig,
    /// Artifact storage.
    pub storage: StorageConfig,
    /// The strip source.
    pub source: SourceConfig,
    /// The liveness endpoint.
    pub heartbeat: HeartbeatConfig,
    /// Feed rendering.
    pub feed: FeedConfig,
    /// Daily trigger.
    pub schedule: ScheduleConfig,
    /// Per-run limits.
    pub run: RunConfig,
    /// The ordered step list.
    pub steps: Vec<StepConfig>,
}

impl Default for FeedflowConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            source: SourceConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            feed: FeedConfig::default(),
            schedule: ScheduleConfig::default(),
            run: RunConfig::default(),
            steps: default_step_configs(),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name reported with every run.
    pub name: String,
    /// What to do with a trigger while a run is in flight.
    pub overlap: OverlapPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "feedflow".to_string(),
            overlap: OverlapPolicy::Reject,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding stored artifacts.
    pub root: PathBuf,
    /// Base of public artifact URLs. Defaults to a `file://` URL of `root`.
    pub public_base_url: Option<String>,
    /// Key prefix for strip images.
    pub strips_dir: String,
    /// Key of the rendered feed.
    pub feed_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts"),
            public_base_url: None,
            strips_dir: "strips".to_string(),
            feed_path: "v2/rss.xml".to_string(),
        }
    }
}

impl StorageConfig {
    /// Returns the base of public artifact URLs.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("file://{}", self.root.display()))
    }
}

/// Strip source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Site the strip pages are scraped from.
    pub base_url: String,
    /// `User-Agent` for scrape and download requests.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_seconds: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dilbert.com".to_string(),
            user_agent: "feedflow".to_string(),
            timeout_seconds: 8.0,
        }
    }
}

/// Liveness endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Endpoint pinged after a successful build. A trigger may override it.
    pub endpoint: Option<String>,
    /// Fixed `User-Agent` marker.
    pub user_agent: String,
    /// Request timeout.
    pub timeout_seconds: f64,
    /// Text the response body must contain, if set.
    pub expected_body: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_agent: "feedflow".to_string(),
            timeout_seconds: 5.0,
            expected_body: None,
        }
    }
}

/// Feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Number of days covered by the feed.
    pub length: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { length: 30 }
    }
}

/// Daily trigger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fire time of day, `HH:MM` in UTC.
    pub daily_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: "08:00".to_string(),
        }
    }
}

/// Per-run limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock budget after which a run is cancelled.
    pub budget_seconds: Option<u64>,
}

/// Retry settings for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failure classes that are retried.
    pub retry_on: Vec<ErrorClass>,
    /// Wait before the first retry.
    pub interval_seconds: f64,
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Multiplier applied to each further wait.
    pub backoff_rate: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            retry_on: policy.retry_on,
            interval_seconds: policy.interval.as_secs_f64(),
            max_attempts: policy.max_attempts,
            backoff_rate: policy.backoff_rate,
        }
    }
}

impl RetryConfig {
    fn to_policy(&self, step: &str) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new()
            .with_retry_on(self.retry_on.iter().copied())
            .with_interval(seconds(
                &format!("steps.{step}.retry.interval_seconds"),
                self.interval_seconds,
            )?)
            .with_max_attempts(self.max_attempts)
            .with_backoff_rate(self.backoff_rate))
    }
}

/// One configured step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step name.
    pub name: String,
    /// Worker capability.
    pub capability: Capability,
    /// Context key for the step's output.
    pub result_key: String,
    /// Per-invocation timeout.
    #[serde(default = "default_step_timeout")]
    pub timeout_seconds: f64,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_step_timeout() -> f64 {
    10.0
}

impl StepConfig {
    /// Creates a step config with default timeout and retry settings.
    #[must_use]
    pub fn new(name: impl Into<String>, capability: Capability, result_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capability,
            result_key: result_key.into(),
            timeout_seconds: default_step_timeout(),
            retry: RetryConfig::default(),
        }
    }

    /// Converts to a step definition.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration is negative or not finite.
    pub fn to_definition(&self) -> Result<StepDefinition, ConfigError> {
        let timeout = seconds(&format!("steps.{}.timeout_seconds", self.name), self.timeout_seconds)?;
        Ok(
            StepDefinition::new(&self.name, self.capability, &self.result_key)
                .with_timeout(timeout)
                .with_retry(self.retry.to_policy(&self.name)?),
        )
    }
}

/// The standard GetStrip, GenFeed, SendHeartbeat sequence.
#[must_use]
pub fn default_step_configs() -> Vec<StepConfig> {
    vec![
        StepConfig::new("GetStrip", Capability::Fetch, "strip"),
        StepConfig::new("GenFeed", Capability::Build, "feed"),
        StepConfig::new("SendHeartbeat", Capability::Ping, "heartbeat"),
    ]
}

impl FeedflowConfig {
    /// Parses configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads configuration: the file if given (defaults otherwise), then
    /// process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment overrides using `lookup` to read variables.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = get(ENV_PUBLIC_BASE_URL) {
            self.storage.public_base_url = Some(url);
        }
        if let Some(dir) = get(ENV_STRIPS_DIR) {
            self.storage.strips_dir = dir;
        }
        if let Some(path) = get(ENV_FEED_PATH) {
            self.storage.feed_path = path;
        }
        if let Some(endpoint) = get(ENV_HEARTBEAT_ENDPOINT) {
            self.heartbeat.endpoint = Some(endpoint);
        }
        if let Some(url) = get(ENV_SOURCE_URL) {
            self.source.base_url = url;
        }
    }

    /// Converts the step list to definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured duration is invalid.
    pub fn step_definitions(&self) -> Result<Vec<StepDefinition>, ConfigError> {
        self.steps.iter().map(StepConfig::to_definition).collect()
    }

    /// Creates a builder holding the validated step list.
    ///
    /// # Errors
    ///
    /// Returns a config error for unusable durations, or an orchestration
    /// error for an invalid step list.
    pub fn pipeline_builder(&self) -> Result<PipelineBuilder, FeedflowError> {
        let mut builder =
            PipelineBuilder::new(&self.pipeline.name).with_overlap_policy(self.pipeline.overlap);
        for step in self.step_definitions()? {
            builder.add_step(step)?;
        }
        Ok(builder)
    }

    /// Parses the daily trigger time.
    ///
    /// # Errors
    ///
    /// Returns an error if `schedule.daily_at` is not `HH:MM`.
    pub fn schedule(&self) -> Result<DailySchedule, ConfigError> {
        DailySchedule::parse(&self.schedule.daily_at)
            .map_err(|reason| ConfigError::invalid("schedule.daily_at", reason))
    }

    /// Returns the per-run wall-clock budget, if configured.
    #[must_use]
    pub fn run_budget(&self) -> Option<Duration> {
        self.run.budget_seconds.map(Duration::from_secs)
    }

    /// Returns the source request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured value is invalid.
    pub fn source_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("source.timeout_seconds", self.source.timeout_seconds)
    }

    /// Returns the heartbeat request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured value is invalid.
    pub fn heartbeat_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("heartbeat.timeout_seconds", self.heartbeat.timeout_seconds)
    }

    /// Checks everything a run depends on.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), FeedflowError> {
        if self.feed.length == 0 {
            return Err(ConfigError::invalid("feed.length", "must be at least 1").into());
        }
        self.schedule()?;
        self.source_timeout()?;
        self.heartbeat_timeout()?;
        let builder = self.pipeline_builder()?;
        if builder.step_count() == 0 {
            return Err(OrchestrationError::empty_pipeline().into());
        }
        Ok(())
    }
}
