//! Agent configuration
//!
//! Handles:
//! - Sensor selection and PurpleAir endpoint
//! - Poll cadence
//! - Output sinks (SQLite and/or CSV) and base directory
//! - Failure policy for scheduled ticks
//!
//! Read from a TOML file whose path comes from `AIRWATCH_CONFIG`
//! (default `airwatch.toml`). A missing file means defaults.

use airwatch_core::{AbortPolicy, Depth3Keys, FailurePolicy, RetryPolicy, SkipPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_ENV: &str = "AIRWATCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "airwatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub sensor: SensorConfig,
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
    pub credentials: CredentialsConfig,
    pub flatten: FlattenConfig,
    pub failure: FailureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// PurpleAir sensor index
    pub id: String,
    pub api_base: String,
    /// No timeout when unset
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// PurpleAir refreshes real-time data every 2 minutes
    pub interval_minutes: u64,
    /// Stop after this many ticks; unset runs until interrupted
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// A fresh `database_<timestamp>` directory is created here on every start
    pub base_dir: PathBuf,
    pub sqlite: bool,
    pub csv: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    pub depth3_keys: Depth3Keys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub policy: PolicyKind,
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Abort,
    Skip,
    Retry,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sensor id must be a non-empty alphanumeric string, got {0:?}")]
    InvalidSensorId(String),
    #[error("poll interval must be at least one minute")]
    ZeroInterval,
    #[error("retry policy needs max_attempts >= 1")]
    ZeroAttempts,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            id: "143856".to_string(),
            api_base: "https://api.purpleair.com/v1".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 2,
            max_ticks: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            sqlite: true,
            csv: true,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from("./purpleair_api_read_key"),
        }
    }
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Abort,
            max_attempts: 3,
            backoff_secs: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl FailureConfig {
    pub fn build_policy(&self) -> Box<dyn FailurePolicy> {
        match self.policy {
            PolicyKind::Abort => Box::new(AbortPolicy),
            PolicyKind::Skip => Box::new(SkipPolicy),
            PolicyKind::Retry => Box::new(RetryPolicy::new(
                self.max_attempts,
                Duration::from_secs(self.backoff_secs),
            )),
        }
    }
}

impl AgentConfig {
    /// Load config from `$AIRWATCH_CONFIG` or `./airwatch.toml`
    pub async fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(Path::new(&path)).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = &self.sensor.id;
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidSensorId(id.clone()));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.failure.policy == PolicyKind::Retry && self.failure.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}
