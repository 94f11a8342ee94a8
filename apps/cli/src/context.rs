use std::path::PathBuf;

use anyhow::Context as _;
use prismdrive_api::Client;
use prismdrive_protocol::Token;
use prismdrive_settings::{AuthConfig, Settings, TokenStore, config_path};
use prismdrive_transfer::{ExecutorConfig, TransferExecutor};

use crate::cli::Cli;

/// Environment variable holding a token that overrides the stored one.
pub const TOKEN_ENV: &str = "PRISMDRIVE_TOKEN";

/// Everything a command needs from flags, environment and config file.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub base_url: String,
    pub auth: AuthConfig,
}

impl Context {
    /// Resolves settings: flags, then environment, then config file.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => config_path().context("locating the configuration file")?,
        };
        let token_override = std::env::var(TOKEN_ENV).ok();
        Self::resolve(path, cli.api_base_url.clone(), token_override)
    }

    pub fn resolve(
        config_file: PathBuf,
        base_url: Option<String>,
        token_override: Option<String>,
    ) -> anyhow::Result<Self> {
        let settings = Settings::load_from(&config_file)
            .with_context(|| format!("loading {}", config_file.display()))?;

        let base_url = base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| settings.base_url.clone());

        let dir = config_file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let auth = AuthConfig::new(TokenStore::in_dir(&dir)).with_override(token_override);

        tracing::debug!(base_url = %base_url, config = %config_file.display(), "context resolved");
        Ok(Self {
            settings,
            base_url,
            auth,
        })
    }

    pub fn api_client(&self, token: Option<&Token>) -> anyhow::Result<Client> {
        Client::new(self.base_url.clone(), token).context("building the HTTP client")
    }

    pub fn executor(&self) -> anyhow::Result<TransferExecutor> {
        let config = ExecutorConfig {
            chunk_size: self.settings.chunk_size(),
            connect_timeout: self.settings.connect_timeout(),
            write_idle_timeout: self.settings.write_idle_timeout(),
            response_timeout: self.settings.response_timeout(),
            ..ExecutorConfig::default()
        };
        TransferExecutor::new(config).context("building the upload client")
    }
}
