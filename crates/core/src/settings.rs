use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feedback::FeedbackMode;
use crate::provider_policy::DEFAULT_MODEL_SELECTOR;

pub const DEFAULT_API_URL: &str = "http://localhost:8001";
pub const API_URL_ENV: &str = "ASKQL_API_URL";
pub const CONFIG_DIR_ENV: &str = "ASKQL_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub default_model: String,
    pub feedback_mode: FeedbackMode,
    /// Absent means the transport's own behavior; the client adds no limit.
    pub request_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            default_model: DEFAULT_MODEL_SELECTOR.to_string(),
            feedback_mode: FeedbackMode::default(),
            request_timeout_secs: None,
            log_file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read settings file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    pub fn load_default() -> Result<Self, SettingsError> {
        let path = default_settings_path()?;
        let mut settings = Self::load_from_path(path)?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup(API_URL_ENV).filter(|value| !value.is_empty()) {
            self.api_url = api_url;
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn log_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.log_file {
            return Ok(path.clone());
        }
        Ok(config_dir()?.join("askql.log"))
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    Ok(config_dir()?.join("settings.toml"))
}

fn config_dir() -> Result<PathBuf, SettingsError> {
    if let Some(custom) = env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(custom));
    }

    let base_dir = if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(SettingsError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(SettingsError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("askql"))
}
