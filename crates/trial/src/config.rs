//! Trial configuration.
//!
//! Configuration is built programmatically with [`TrialConfig::default()`]
//! and the `with_*` setters, or read from a JSON file with
//! [`TrialConfig::from_json_file()`]. Durations are written as seconds:
//!
//! ```json
//! {
//!   "mode": "cached",
//!   "interval_secs": 2.0,
//!   "mutation_rate": 0.25,
//!   "batch_size": 40,
//!   "exhaustion": "refetch"
//! }
//! ```
//!
//! Missing fields take their default value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrialError};

/// How new parameter sets are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Query the optimizer on every re-evaluation
    #[default]
    Live,
    /// Draw from a pre-fetched batch on explicit triggers
    Cached,
}

/// What a draw does once the cached batch is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Report that no candidate is available and keep the parameters
    #[default]
    Signal,
    /// Prefetch a new batch and draw from it
    Refetch,
}

/// Configuration for one trial controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Synchronization strategy, fixed for the agent's lifetime
    pub mode: SyncMode,

    /// Time between re-evaluations
    #[serde(rename = "interval_secs", with = "secs")]
    pub interval: Duration,

    /// Probability with which the optimizer perturbs returned values
    pub mutation_rate: f64,

    /// Number of top-ranked generations the optimizer breeds from
    pub generation_count: u32,

    /// Opaque switch forwarded to the optimizer
    pub service_flag: bool,

    /// Score submitted when the success event fires
    pub success_score: f64,

    /// Upper bound for any single optimizer call
    #[serde(rename = "exchange_timeout_secs", with = "secs")]
    pub exchange_timeout: Duration,

    /// Erase namespace history before a live trial starts
    pub clear_history_on_start: bool,

    /// Populate once when a live trial starts
    pub populate_on_start: bool,

    /// Candidates fetched per cached batch
    pub batch_size: usize,

    /// Behavior of a draw on an empty batch
    pub exhaustion: ExhaustionPolicy,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Live,
            interval: Duration::from_secs(2),
            mutation_rate: 0.25,
            generation_count: 2,
            service_flag: false,
            success_score: 100.0,
            exchange_timeout: Duration::from_secs(10),
            clear_history_on_start: true,
            populate_on_start: true,
            batch_size: 40,
            exhaustion: ExhaustionPolicy::Signal,
        }
    }
}

impl TrialConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the synchronization mode.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the re-evaluation interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the mutation rate.
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Set the number of parent generations.
    pub fn with_generation_count(mut self, count: u32) -> Self {
        self.generation_count = count;
        self
    }

    /// Set the opaque optimizer flag.
    pub fn with_service_flag(mut self, flag: bool) -> Self {
        self.service_flag = flag;
        self
    }

    /// Set the ceiling score submitted on success.
    pub fn with_success_score(mut self, score: f64) -> Self {
        self.success_score = score;
        self
    }

    /// Set the per-call optimizer timeout.
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Enable or disable clearing history at start.
    pub fn with_clear_history_on_start(mut self, clear: bool) -> Self {
        self.clear_history_on_start = clear;
        self
    }

    /// Enable or disable the start-up populate.
    pub fn with_populate_on_start(mut self, populate: bool) -> Self {
        self.populate_on_start = populate;
        self
    }

    /// Set the cached batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the exhaustion policy.
    pub fn with_exhaustion(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion = policy;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(TrialError::InvalidConfig("interval must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(TrialError::InvalidConfig(format!(
                "mutation_rate {} is outside [0, 1]",
                self.mutation_rate
            )));
        }
        if self.generation_count == 0 {
            return Err(TrialError::InvalidConfig("generation_count must be at least 1".into()));
        }
        if !self.success_score.is_finite() {
            return Err(TrialError::InvalidConfig("success_score must be finite".into()));
        }
        if self.exchange_timeout.is_zero() {
            return Err(TrialError::InvalidConfig("exchange_timeout must be positive".into()));
        }
        if self.mode == SyncMode::Cached && self.batch_size == 0 {
            return Err(TrialError::InvalidConfig("cached mode needs batch_size > 0".into()));
        }
        Ok(())
    }
}

/// Serialize a [`Duration`] as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
