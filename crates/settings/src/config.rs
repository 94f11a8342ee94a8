//! CLI settings.
//!
//! Stored as TOML:
//! - Linux/macOS: `~/.config/prismdrive/config.toml`
//! - Windows: `%APPDATA%/prismdrive/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use prismdrive_protocol::constants::{DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::SettingsError;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = 16 * 1024;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Persistent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Device name sent at login.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Bytes read from the local file per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long to wait for the answer after the last byte was sent.
    /// How long the server may leave an upload chunk unread.
    #[serde(default = "default_write_idle_timeout")]
    pub write_idle_timeout_secs: u64,

    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// Extra attempts for transient streaming failures.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before the first retry; doubled for each later one.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_device_name() -> String {
    "prismdrive-cli".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_write_idle_timeout() -> u64 {
    60
}

fn default_response_timeout() -> u64 {
    300
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            device_name: default_device_name(),
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout(),
            write_idle_timeout_secs: default_write_idle_timeout(),
            response_timeout_secs: default_response_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl Settings {
    /// Loads settings from the default location, or creates a default file.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&config_path()?)
    }

    /// Loads settings from `path`, creating it with defaults if missing.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(settings)
        } else {
            let settings = Settings::default();
            settings.save_to(path)?;
            Ok(settings)
        }
    }

    /// Saves to the default location.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&config_path()?)
    }

    /// Saves to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Chunk size clamped to the accepted range.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.write_idle_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Directory holding the settings and token files.
pub fn config_dir() -> Result<PathBuf, SettingsError> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var_os("APPDATA").ok_or(SettingsError::NoConfigDir)?;
        Ok(PathBuf::from(appdata).join("prismdrive"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var_os("HOME").ok_or(SettingsError::NoConfigDir)?;
        Ok(PathBuf::from(home).join(".config").join("prismdrive"))
    }
}

/// Default settings file path.
pub fn config_path() -> Result<PathBuf, SettingsError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}
