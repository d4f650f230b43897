// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration.

use pw_backplane::DEQUEUE_SUFFIX;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid worker config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("queue name '{0}' ends with reserved suffix '{DEQUEUE_SUFFIX}'")]
    ReservedQueueName(String),

    #[error("stage width must be at least 1 (got {0})")]
    ZeroWidth(u32),
}

/// Queue the worker matches against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base list name; the `_dequeue` sibling is derived from it.
    pub name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { name: "operations".to_string() }
    }
}

/// Liveness poller settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Tick period in milliseconds. Keep at or below half the backplane's
    /// liveness window or held entries will be swept as orphaned.
    pub period_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { period_ms: 1_000 }
    }
}

impl PollerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Top-level worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Stable worker identifier reported in execution metadata.
    pub name: String,
    pub queue: QueueConfig,
    /// Blocking dequeue timeout in milliseconds; zero means non-blocking.
    pub dequeue_timeout_ms: u64,
    pub poller: PollerConfig,
    /// Input-fetch stage width.
    pub input_fetch_width: u32,
    /// Execute stage width; also the clamp for per-action core claims.
    pub execute_width: u32,
    /// Report stage width.
    pub report_width: u32,
    /// Start with the graceful-shutdown latch already set (drain-only
    /// worker: in-flight work completes, nothing new is matched).
    pub graceful_shutdown: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            queue: QueueConfig::default(),
            dequeue_timeout_ms: 1_000,
            poller: PollerConfig::default(),
            input_fetch_width: 1,
            execute_width: 4,
            report_width: 1,
            graceful_shutdown: false,
        }
    }
}

impl WorkerConfig {
    /// Parse from TOML and validate.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: WorkerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.name.ends_with(DEQUEUE_SUFFIX) {
            return Err(ConfigError::ReservedQueueName(self.queue.name.clone()));
        }
        for width in [self.input_fetch_width, self.execute_width, self.report_width] {
            if width == 0 {
                return Err(ConfigError::ZeroWidth(width));
            }
        }
        Ok(())
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
