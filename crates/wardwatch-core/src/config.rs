//! Configuration for wardwatch.
//!
//! Loaded from `~/.wardwatch/config.yaml`. Every section is optional and falls
//! back to defaults, so a missing file is the same as an empty one.
//!
//! ```yaml
//! database_path: /var/lib/wardwatch/vitals.db
//! escalation:
//!   tick_interval_secs: 30
//!   grace_period_mins: 15
//!   renotify_interval_mins: 15
//!   lookahead_mins: 15
//! schedule:
//!   min_interval_mins: 15
//!   max_interval_mins: 1440
//! client:
//!   poll_interval_secs: 30
//!   due_toast_secs: 10
//!   overdue_toast_secs: 15
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::due::{
    DEFAULT_GRACE_PERIOD_MINS, DEFAULT_MAX_INTERVAL_MINS, DEFAULT_MIN_INTERVAL_MINS, IntervalBounds,
};
use crate::error::{Result, WardError};
use crate::logging::wardwatch_dir;

/// Top-level wardwatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WardwatchConfig {
    /// SQLite database file (defaults to `~/.wardwatch/vitals.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Escalation clock configuration
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Schedule validation configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Polling client configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Escalation clock timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EscalationConfig {
    /// Seconds between evaluator ticks
    pub tick_interval_secs: u64,

    /// Minutes after `due_at` before an alert becomes overdue
    pub grace_period_mins: i64,

    /// Minutes between repeat notifications while overdue
    pub renotify_interval_mins: i64,

    /// Minutes ahead of `next_due_at` that a pending alert is created
    pub lookahead_mins: i64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            grace_period_mins: DEFAULT_GRACE_PERIOD_MINS,
            renotify_interval_mins: 15,
            lookahead_mins: 15,
        }
    }
}

impl EscalationConfig {
    /// Tick cadence as a std duration (for `tokio::time::interval`).
    pub fn tick_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.tick_interval_secs)
    }

    /// Grace period as a chrono duration.
    pub fn grace_period(&self) -> Duration {
        Duration::minutes(self.grace_period_mins)
    }

    /// Re-notification interval as a chrono duration.
    pub fn renotify_interval(&self) -> Duration {
        Duration::minutes(self.renotify_interval_mins)
    }

    /// Pending-alert lookahead as a chrono duration.
    pub fn lookahead(&self) -> Duration {
        Duration::minutes(self.lookahead_mins)
    }
}

/// Schedule interval bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub min_interval_mins: i64,
    pub max_interval_mins: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_mins: DEFAULT_MIN_INTERVAL_MINS,
            max_interval_mins: DEFAULT_MAX_INTERVAL_MINS,
        }
    }
}

impl ScheduleConfig {
    /// Interval bounds for schedule validation.
    pub fn bounds(&self) -> Result<IntervalBounds> {
        IntervalBounds::new(self.min_interval_mins, self.max_interval_mins)
    }
}

/// Polling client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds between feed polls
    pub poll_interval_secs: u64,

    /// Seconds a due notification stays on screen
    pub due_toast_secs: u64,

    /// Seconds an overdue notification stays on screen
    pub overdue_toast_secs: u64,

    /// Local preference file (defaults to `~/.wardwatch/alert-preferences.json`)
    pub preferences_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            due_toast_secs: 10,
            overdue_toast_secs: 15,
            preferences_path: None,
        }
    }
}

impl ClientConfig {
    /// Poll cadence as a std duration.
    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.poll_interval_secs)
    }
}

impl WardwatchConfig {
    /// Default config file path, `~/.wardwatch/config.yaml`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(wardwatch_dir()?.join("config.yaml"))
    }

    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "config file does not exist, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WardError::ConfigNotFound {
                    path: path.to_path_buf(),
                    source: Some(e),
                }
            } else {
                WardError::io("reading config", path, e)
            }
        })?;

        let config = Self::parse(&content).map_err(|message| WardError::ConfigInvalid {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;

        debug!(path = %path.display(), "loaded wardwatch config");
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str::<WardwatchConfig>(content).map_err(|e| e.to_string())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let esc = &self.escalation;
        if esc.tick_interval_secs == 0 {
            return Err(WardError::ConfigValidation {
                message: "escalation.tick_interval_secs must be > 0".into(),
            });
        }
        if esc.grace_period_mins <= 0 {
            return Err(WardError::ConfigValidation {
                message: format!(
                    "escalation.grace_period_mins must be > 0, got {}",
                    esc.grace_period_mins
                ),
            });
        }
        if esc.renotify_interval_mins <= 0 {
            return Err(WardError::ConfigValidation {
                message: format!(
                    "escalation.renotify_interval_mins must be > 0, got {}",
                    esc.renotify_interval_mins
                ),
            });
        }
        if esc.lookahead_mins < 0 {
            return Err(WardError::ConfigValidation {
                message: format!(
                    "escalation.lookahead_mins must be >= 0, got {}",
                    esc.lookahead_mins
                ),
            });
        }

        self.schedule.bounds()?;

        let client = &self.client;
        if client.poll_interval_secs == 0 || client.due_toast_secs == 0 || client.overdue_toast_secs == 0
        {
            return Err(WardError::ConfigValidation {
                message: "client poll and toast durations must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Resolved database path.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(wardwatch_dir()?.join("vitals.db")),
        }
    }

    /// Resolved client preference file path.
    pub fn preferences_path(&self) -> Result<PathBuf> {
        match &self.client.preferences_path {
            Some(path) => Ok(path.clone()),
            None => Ok(wardwatch_dir()?.join("alert-preferences.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WardwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.escalation.grace_period(), Duration::minutes(15));
        assert_eq!(config.escalation.tick_interval(), StdDuration::from_secs(30));
        assert_eq!(config.client.due_toast_secs, 10);
        assert_eq!(config.client.overdue_toast_secs, 15);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = WardwatchConfig::parse(
            "escalation:\n  tick_interval_secs: 60\nschedule:\n  max_interval_mins: 720\n",
        )
        .unwrap();
        assert_eq!(config.escalation.tick_interval_secs, 60);
        assert_eq!(config.escalation.grace_period_mins, 15);
        assert_eq!(config.schedule.max_interval_mins, 720);
        assert_eq!(config.schedule.min_interval_mins, 15);
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(WardwatchConfig::parse("").unwrap(), WardwatchConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WardwatchConfig::default();
        config.escalation.tick_interval_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = WardwatchConfig::default();
        config.schedule.min_interval_mins = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path: /tmp/ward.db").unwrap();
        writeln!(file, "client:").unwrap();
        writeln!(file, "  poll_interval_secs: 5").unwrap();

        let config = WardwatchConfig::load_from(file.path()).unwrap();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/ward.db"));
        assert_eq!(config.client.poll_interval(), StdDuration::from_secs(5));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "escalation: [not, a, map").unwrap();

        let err = WardwatchConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, WardError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = WardwatchConfig::load_from(Path::new("/nonexistent/wardwatch.yaml")).unwrap_err();
        assert!(matches!(err, WardError::ConfigNotFound { .. }));
    }
}
