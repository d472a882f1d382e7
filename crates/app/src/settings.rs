//! Handles settings for the daemon. Configuration is written in
//! `settings.toml` (or the file named by `LEDGER_CONFIG`); any key can be
//! overridden with a `LEDGER_` environment variable, nested keys separated by
//! `__` (e.g. `LEDGER_DATABASE__URL`).
use config::{Config, ConfigError, Environment, File};
use engine::StaticSettings;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite:./ledger.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Periodic jobs. An interval of `0` disables the job.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub accrual_interval_secs: u64,
    pub expiry_interval_secs: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            accrual_interval_secs: 60 * 60,
            expiry_interval_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub scheduler: Scheduler,
    /// Referral levels and financial knobs handed to the engine as-is.
    #[serde(default)]
    pub engine: StaticSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let path =
            std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(&path)
    }

    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}
