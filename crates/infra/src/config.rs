//! Engine configuration.
//!
//! Defaults match the production deployment; each knob can be overridden from
//! the environment (see [`EngineConfig::from_env`]).

use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

pub const STALE_AFTER_DAYS: &str = "BRAPOOL_STALE_AFTER_DAYS";
pub const LOG_RETENTION_DAYS: &str = "BRAPOOL_LOG_RETENTION_DAYS";
pub const LOG_PAGE_SIZE: &str = "BRAPOOL_LOG_PAGE_SIZE";
pub const NOTIFY_TIMEOUT_SECS: &str = "BRAPOOL_NOTIFY_TIMEOUT_SECS";
pub const SWEEP_INTERVAL_SECS: &str = "BRAPOOL_SWEEP_INTERVAL_SECS";
pub const NOTIFY_RECIPIENTS: &str = "BRAPOOL_NOTIFY_RECIPIENTS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a positive integer, got {value:?}")]
    NotAPositiveInteger { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Circulating items untouched for longer than this are reported stale.
    pub stale_after: TimeDelta,
    /// Audit entries older than this are purged.
    pub log_retention: TimeDelta,
    pub log_page_size: u32,
    /// Upper bound for one notification attempt to one recipient.
    pub notify_timeout: Duration,
    /// Period of the background maintenance worker. `None` keeps maintenance
    /// lazy (triggered by log retrieval only).
    pub sweep_interval: Option<Duration>,
    pub recipients: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: TimeDelta::weeks(6),
            log_retention: TimeDelta::weeks(10),
            log_page_size: 40,
            notify_timeout: Duration::from_secs(10),
            sweep_interval: None,
            recipients: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `BRAPOOL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(days) = positive(&lookup, STALE_AFTER_DAYS)? {
            config.stale_after = TimeDelta::days(days as i64);
        }
        if let Some(days) = positive(&lookup, LOG_RETENTION_DAYS)? {
            config.log_retention = TimeDelta::days(days as i64);
        }
        if let Some(size) = positive(&lookup, LOG_PAGE_SIZE)? {
            config.log_page_size = u32::try_from(size).map_err(|_| ConfigError::NotAPositiveInteger {
                var: LOG_PAGE_SIZE,
                value: size.to_string(),
            })?;
        }
        if let Some(secs) = positive(&lookup, NOTIFY_TIMEOUT_SECS)? {
            config.notify_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = positive(&lookup, SWEEP_INTERVAL_SECS)? {
            config.sweep_interval = Some(Duration::from_secs(secs));
        }
        if let Some(list) = lookup(NOTIFY_RECIPIENTS) {
            config.recipients = list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}

fn positive<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    // Capped so day counts stay well inside chrono's range.
    match trimmed.parse::<u64>() {
        Ok(v) if v > 0 && v <= u32::MAX as u64 => Ok(Some(v)),
        _ => Err(ConfigError::NotAPositiveInteger { var, value: raw }),
    }
}
