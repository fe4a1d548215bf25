//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Environment variables prefixed with `TASKMASTER_` (e.g. `TASKMASTER_WATCH_INTERVAL_MS`)
//! 2. `config.toml` in the platform configuration directory
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::TimeFrame;

const fn default_watch_interval_ms() -> u64 {
    1000
}

fn default_frame() -> String {
    TimeFrame::Daily.as_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Journal database to use instead of the one in the data directory.
    #[serde(default)]
    pub journal_file: Option<PathBuf>,

    /// Default log filter when neither `-v`, `-q` nor `TASKMASTER_LOG` is given.
    #[serde(default)]
    pub log_level: Option<String>,

    /// How often `watch` refreshes timers and checks for changes.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Time frame shown by `dashboard` and `list` when none is given.
    #[serde(default = "default_frame")]
    pub default_frame: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            journal_file: None,
            log_level: None,
            watch_interval_ms: default_watch_interval_ms(),
            default_frame: default_frame(),
        }
    }
}

impl Config {
    /// Load from the default locations.
    pub fn load(config_dir: Option<&Path>) -> Result<Config, ConfigError> {
        Config::from_figment(Config::figment(config_dir))
    }

    pub fn figment(config_dir: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = config_dir {
            let path = dir.join("config.toml");
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        figment.merge(Env::prefixed("TASKMASTER_").ignore(&["log"]))
    }

    pub fn from_figment(figment: Figment) -> Result<Config, ConfigError> {
        let config: Config = figment.extract()?;
        config.default_frame()?;
        if config.watch_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    pub fn default_frame(&self) -> Result<TimeFrame, ConfigError> {
        self.default_frame
            .parse()
            .map_err(|err: crate::model::UnknownVariant| ConfigError::InvalidValue {
                field: "default_frame",
                reason: err.to_string(),
            })
    }
}
