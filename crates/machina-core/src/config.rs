//! Configuration management.
//!
//! Machina configuration is loaded from multiple sources with the following
//! priority:
//!
//! 1. Environment variables (MACHINA_*)
//! 2. User configuration file (~/.config/machina/config.toml)
//! 3. System configuration file (/etc/machina/config.toml)
//! 4. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! # Machina configuration file
//! data_dir = "~/.machina"
//! default_provider = "noop"
//!
//! [logging]
//! level = "info"
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Machina configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory (box storage, logs).
    pub data_dir: PathBuf,
    /// Provider class used for machines that declare none.
    pub default_provider: String,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_provider: "noop".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()))
            .merge(Env::prefixed("MACHINA_").split("_"))
            .extract()
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("MACHINA_").split("_"))
            .extract()
    }

    /// Returns the path to the box storage directory.
    #[must_use]
    pub fn boxes_dir(&self) -> PathBuf {
        self.data_dir.join("boxes")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log to file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join(".machina")
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("machina")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/machina/config.toml")
}
