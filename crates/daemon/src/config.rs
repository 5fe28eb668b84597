// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration file
//!
//! TOML with humantime durations. Every section has defaults, so an empty
//! file is a valid configuration.

use cadence_core::{parse_utc_offset, QueueConfig};
use cadence_engine::{MaintenanceConfig, PoolConfig, RuntimeConfig, SweepConfig};
use cadence_resilience::{CircuitConfig, HealthConfig, RetryConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub maintenance_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub failed_sweep_interval: Duration,
    /// Offset `scheduled` trigger times are read in, e.g. `"+09:00"`
    pub utc_offset: String,
    /// Name of the sender in health reports and circuit states
    pub dependency: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let runtime = RuntimeConfig::default();
        Self {
            tick_interval: runtime.tick_interval,
            maintenance_interval: runtime.maintenance_interval,
            failed_sweep_interval: runtime.failed_sweep_interval,
            utc_offset: "+00:00".to_string(),
            dependency: runtime.dependency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SenderSection {
    /// Messaging gateway URL; messages are dropped by a no-op sender when
    /// unset
    pub endpoint: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub health_url: Option<String>,
}

impl Default for SenderSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout: Duration::from_secs(10),
            health_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// JSON file of subjects, programs, steps and enrollments
    pub seed_path: Option<PathBuf>,
    /// Log file; logs go to stderr when unset
    pub log_path: Option<PathBuf>,
    /// Directory for the queue snapshot and the pid lock. Without it the
    /// queue lives in memory only.
    pub state_dir: Option<PathBuf>,
    pub scheduler: SchedulerSection,
    pub queue: QueueConfig,
    pub workers: PoolConfig,
    pub circuit: CircuitConfig,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub sender: SenderSection,
    pub sweep: SweepConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("scheduler.tick_interval", self.scheduler.tick_interval),
            ("scheduler.maintenance_interval", self.scheduler.maintenance_interval),
            ("scheduler.failed_sweep_interval", self.scheduler.failed_sweep_interval),
            ("health.check_interval", self.health.check_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be at least 1".into()));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit.failure_threshold must be at least 1".into(),
            ));
        }
        if self.scheduler.dependency.trim().is_empty() {
            return Err(ConfigError::Invalid("scheduler.dependency must not be empty".into()));
        }
        parse_utc_offset(&self.scheduler.utc_offset)
            .map_err(|e| ConfigError::Invalid(e.message))?;
        Ok(())
    }

    /// Path of the queue snapshot directory, when one is configured
    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("snapshots"))
    }

    pub fn lock_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("cadenced.pid"))
    }

    pub fn runtime_config(&self) -> Result<RuntimeConfig, ConfigError> {
        let utc_offset = parse_utc_offset(&self.scheduler.utc_offset)
            .map_err(|e| ConfigError::Invalid(e.message))?;
        Ok(RuntimeConfig {
            tick_interval: self.scheduler.tick_interval,
            maintenance_interval: self.scheduler.maintenance_interval,
            failed_sweep_interval: self.scheduler.failed_sweep_interval,
            utc_offset,
            dependency: self.scheduler.dependency.clone(),
            pool: self.workers.clone(),
            sweep: self.sweep.clone(),
            maintenance: self.maintenance.clone(),
            retry: self.retry.clone(),
            circuit: self.circuit.clone(),
            health: self.health.clone(),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
