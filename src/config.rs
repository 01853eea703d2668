use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Retry behavior for opening the stores. `max_retries` is the total open
/// attempt budget; the backoff between attempts doubles from `base_delay_ms`
/// up to `max_delay_ms`, and each attempt is separately bounded by
/// `attempt_timeout_ms` so a hung open cannot stall the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            attempt_timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay before retry number `attempt` (zero-based), capped at the
    /// configured maximum.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    pub data_dir: PathBuf,
    pub retry: RetryPolicy,
    /// Calendar refresh cadence driven by the host's alarm; kept here so the
    /// host and the stores agree on one persisted value.
    pub calendar_refresh_secs: u64,
}

impl BackgroundConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            retry: RetryPolicy::default(),
            calendar_refresh_secs: 300,
        }
    }
}

/// On-disk copy of the runtime configuration with an in-memory cache.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<BackgroundConfig>,
}

impl ConfigStore {
    /// Reads the config file if present; otherwise starts from defaults
    /// rooted at `data_dir`. A malformed file also falls back to defaults.
    pub fn load(path: PathBuf, data_dir: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|_| BackgroundConfig::new(data_dir))
        } else {
            BackgroundConfig::new(data_dir)
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> BackgroundConfig {
        self.data.read().unwrap().clone()
    }

    pub fn update_retry(&self, retry: RetryPolicy) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.retry = retry;
        self.persist(&guard)
    }

    pub fn update_calendar_refresh(&self, refresh_secs: u64) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.calendar_refresh_secs = refresh_secs;
        self.persist(&guard)
    }

    fn persist(&self, data: &BackgroundConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
