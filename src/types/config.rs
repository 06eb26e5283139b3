//! Configuration structures.
//!
//! Configuration is loaded from an optional JSON file and then overridden by
//! `CAREFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Global kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Event queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Dispatch loop configuration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a JSON file (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing sections fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `CAREFLOW_*` overrides read through `lookup`.
    ///
    /// - `CAREFLOW_QUEUE_CAPACITY`: buffer capacity, `0` means unbounded
    /// - `CAREFLOW_OVERFLOW_POLICY`: `drop_newest` or `drop_oldest`
    /// - `CAREFLOW_DEAD_LETTER_CAPACITY`: retained dead letters
    /// - `CAREFLOW_IDLE_WAIT_MS`: idle wait ceiling of the dispatch loop
    /// - `CAREFLOW_LOG_FORMAT`: `json` enables JSON logs
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CAREFLOW_QUEUE_CAPACITY") {
            let capacity: usize = raw
                .parse()
                .map_err(|_| Error::validation(format!("CAREFLOW_QUEUE_CAPACITY: {}", raw)))?;
            self.queue.capacity = (capacity > 0).then_some(capacity);
        }
        if let Some(raw) = lookup("CAREFLOW_OVERFLOW_POLICY") {
            self.queue.overflow = match raw.to_ascii_lowercase().as_str() {
                "drop_newest" => OverflowPolicy::DropNewest,
                "drop_oldest" => OverflowPolicy::DropOldest,
                other => {
                    return Err(Error::validation(format!(
                        "CAREFLOW_OVERFLOW_POLICY: unknown policy {}",
                        other
                    )))
                }
            };
        }
        if let Some(raw) = lookup("CAREFLOW_DEAD_LETTER_CAPACITY") {
            self.queue.dead_letter_capacity = raw.parse().map_err(|_| {
                Error::validation(format!("CAREFLOW_DEAD_LETTER_CAPACITY: {}", raw))
            })?;
        }
        if let Some(raw) = lookup("CAREFLOW_IDLE_WAIT_MS") {
            let millis: u64 = raw
                .parse()
                .map_err(|_| Error::validation(format!("CAREFLOW_IDLE_WAIT_MS: {}", raw)))?;
            self.orchestrator.idle_wait = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup("CAREFLOW_LOG_FORMAT") {
            self.observability.json_logs = raw.eq_ignore_ascii_case("json");
        }
        Ok(())
    }

    /// Reject settings the queue and loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == Some(0) {
            return Err(Error::validation("queue.capacity must be positive or null"));
        }
        if self.orchestrator.idle_wait.is_zero() {
            return Err(Error::validation("orchestrator.idle_wait must be positive"));
        }
        Ok(())
    }
}

/// What a full bounded buffer does with a new message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming message (dead-lettered, producer gets `QueueFull`).
    #[default]
    DropNewest,
    /// Evict the head of the buffer (dead-lettered) and accept the new message.
    DropOldest,
}

/// Event queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum pending messages. `None` means unbounded.
    pub capacity: Option<usize>,

    /// Overflow behaviour when `capacity` is reached.
    pub overflow: OverflowPolicy,

    /// Maximum dead letters retained (oldest evicted first).
    pub dead_letter_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Some(10_000),
            overflow: OverflowPolicy::DropNewest,
            dead_letter_capacity: 1_000,
        }
    }
}

/// Dispatch loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on a single idle wait. The loop wakes earlier on push or stop.
    #[serde(with = "humantime_serde")]
    pub idle_wait: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(50),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
