//! Configuration loader and validator for the availability watcher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub watcher: Watcher,
    pub telegram: Telegram,
    pub source: Source,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Poll scheduler settings. All durations are seconds in the YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Watcher {
    pub poll_interval_secs: u64,
    pub max_concurrent_checks: usize,
    pub check_timeout_secs: u64,
    pub cycle_deadline_secs: u64,
    pub shutdown_grace_secs: u64,
    pub max_slots_shown: usize,
}

impl Watcher {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Telegram bot settings; notifications are delivered as direct messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
}

/// Reservation availability source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub base_url: String,
    pub auth_token: Option<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.watcher.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("watcher.poll_interval_secs must be > 0"));
    }
    if cfg.watcher.max_concurrent_checks == 0 {
        return Err(ConfigError::Invalid("watcher.max_concurrent_checks must be > 0"));
    }
    if cfg.watcher.check_timeout_secs == 0 {
        return Err(ConfigError::Invalid("watcher.check_timeout_secs must be > 0"));
    }
    if cfg.watcher.cycle_deadline_secs < cfg.watcher.check_timeout_secs {
        return Err(ConfigError::Invalid(
            "watcher.cycle_deadline_secs must be >= watcher.check_timeout_secs",
        ));
    }
    if cfg.watcher.shutdown_grace_secs == 0 {
        return Err(ConfigError::Invalid("watcher.shutdown_grace_secs must be > 0"));
    }
    if cfg.watcher.max_slots_shown == 0 {
        return Err(ConfigError::Invalid("watcher.max_slots_shown must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    if cfg.source.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("source.base_url must be non-empty"));
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

watcher:
  poll_interval_secs: 300
  max_concurrent_checks: 10
  check_timeout_secs: 20
  cycle_deadline_secs: 240
  shutdown_grace_secs: 15
  max_slots_shown: 5

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"

source:
  base_url: "https://dining.example.com"
  auth_token: "YOUR_SOURCE_API_TOKEN"
"#
}
