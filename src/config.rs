// ⚙️ Configuration - TOML file, then environment overrides
//
// Precedence: environment > file > defaults.
//   CE_MONITOR_DB             database_path
//   CE_MONITOR_DATA_DIR       compliance_dir
//   CE_MONITOR_BACKFILL_DAYS  backfill_days
//   CE_MONITOR_MUTED          alerts.muted (true/false, 1/0, yes/no)

use crate::alert::AlertConfig;
use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Directory holding compliance-data-*.txt files
    pub compliance_dir: PathBuf,

    /// Trailing days backfilled before each daily run
    pub backfill_days: u32,

    /// Window for "listed in the last N days" reports
    pub report_days: u32,

    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("otc_status.db"),
            compliance_dir: PathBuf::from("compliance-data"),
            backfill_days: 7,
            report_days: 7,
            alerts: AlertConfig::default(),
        }
    }
}

/// Upper bound for backfill_days and report_days (ten years)
pub const MAX_WINDOW_DAYS: u32 = 3650;

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MonitorError::Config(format!("{}: not a boolean: '{}'", key, other))),
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MonitorError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            MonitorError::Config(format!("failed to read {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` (or defaults) and apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any key lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("CE_MONITOR_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(dir) = lookup("CE_MONITOR_DATA_DIR") {
            self.compliance_dir = PathBuf::from(dir);
        }
        if let Some(days) = lookup("CE_MONITOR_BACKFILL_DAYS") {
            self.backfill_days = days.trim().parse().map_err(|_| {
                MonitorError::Config(format!("CE_MONITOR_BACKFILL_DAYS: not a number: '{}'", days))
            })?;
        }
        if let Some(muted) = lookup("CE_MONITOR_MUTED") {
            self.alerts.muted = parse_flag("CE_MONITOR_MUTED", &muted)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(MonitorError::Config("database_path is empty".to_string()));
        }
        if self.report_days == 0 {
            return Err(MonitorError::Config("report_days must be at least 1".to_string()));
        }
        if self.report_days > MAX_WINDOW_DAYS {
            return Err(MonitorError::Config(format!(
                "report_days must be at most {}, got {}",
                MAX_WINDOW_DAYS, self.report_days
            )));
        }
        if self.backfill_days > MAX_WINDOW_DAYS {
            return Err(MonitorError::Config(format!(
                "backfill_days must be at most {}, got {}",
                MAX_WINDOW_DAYS, self.backfill_days
            )));
        }
        Ok(())
    }
}
