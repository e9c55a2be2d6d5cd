//! Configuration types.

use std::time::Duration;

use chrono::NaiveTime;

use crate::error::ConfigError;

/// Top-level configuration, assembled from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub planner: PlannerConfig,
}

impl Config {
    /// Build the full configuration from `DAYFLOW_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env(),
            server: ServerConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            planner: PlannerConfig::from_env()?,
        })
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the local database file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/dayflow.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("DAYFLOW_DB_PATH")
                .unwrap_or_else(|_| Self::default().path),
        }
    }
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the WS/REST server.
    pub port: u16,
    /// Directory for rolling log files.
    pub log_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_dir: "./data/logs".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("DAYFLOW_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let log_dir = std::env::var("DAYFLOW_LOG_DIR")
            .unwrap_or_else(|_| Self::default().log_dir);

        Self { port, log_dir }
    }
}

/// Notification scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the clock monitor samples wall vs monotonic time.
    pub clock_poll_interval: Duration,
    /// Divergence between wall and monotonic elapsed time beyond which a
    /// sleep/clock-change is assumed and all timers are rebuilt.
    pub clock_skew_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            clock_poll_interval: Duration::from_secs(30),
            clock_skew_threshold: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let poll_secs: u64 = std::env::var("DAYFLOW_CLOCK_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let skew_secs: u64 = std::env::var("DAYFLOW_CLOCK_SKEW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Self {
            clock_poll_interval: Duration::from_secs(poll_secs),
            clock_skew_threshold: Duration::from_secs(skew_secs),
        }
    }
}

/// Day planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Start of the working day (local day time on the planning date).
    pub work_start: NaiveTime,
    /// End of the working day.
    pub work_end: NaiveTime,
    /// Gap reserved immediately before each placement that follows an
    /// already-committed interval.
    pub buffer_minutes: u32,
    /// Duration assumed for tasks that carry none.
    pub default_duration_minutes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            buffer_minutes: 10,
            default_duration_minutes: 30,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let work_start = parse_time_var("DAYFLOW_WORK_START", defaults.work_start)?;
        let work_end = parse_time_var("DAYFLOW_WORK_END", defaults.work_end)?;

        if work_start >= work_end {
            return Err(ConfigError::InvalidValue {
                key: "DAYFLOW_WORK_START".to_string(),
                message: format!("working day must start before it ends ({work_start} >= {work_end})"),
            });
        }

        let buffer_minutes: u32 = std::env::var("DAYFLOW_BUFFER_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.buffer_minutes);

        let default_duration_minutes: u32 = std::env::var("DAYFLOW_DEFAULT_DURATION_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_duration_minutes);

        Ok(Self {
            work_start,
            work_end,
            buffer_minutes,
            default_duration_minutes,
        })
    }
}

/// Parse an `HH:MM` time from an environment variable, falling back to the
/// given default when unset.
fn parse_time_var(key: &str, default: NaiveTime) -> Result<NaiveTime, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected HH:MM, got {raw:?}: {e}"),
            }
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_nine_to_five_day() {
        let config = PlannerConfig::default();
        assert_eq!(config.work_start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.work_end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(config.buffer_minutes, 10);
        assert_eq!(config.default_duration_minutes, 30);
    }

    #[test]
    fn parse_time_var_falls_back_when_unset() {
        let fallback = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        let parsed = parse_time_var("DAYFLOW_TEST_UNSET_TIME_VAR", fallback).unwrap();
        assert_eq!(parsed, fallback);
    }
}
