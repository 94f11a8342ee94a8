//! Local state of the PrismDrive CLI: settings file and stored token.

mod auth;
mod config;
mod token;

pub use auth::{AuthConfig, AuthError, require_token};
pub use config::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, Settings, config_dir, config_path};
pub use prismdrive_protocol::constants::DEFAULT_CHUNK_SIZE;
pub use token::{TOKEN_FILE_NAME, TokenStore};

/// Errors produced while reading or writing local state.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot locate the configuration directory")]
    NoConfigDir,
}
