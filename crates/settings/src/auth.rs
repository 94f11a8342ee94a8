use prismdrive_protocol::{ProtocolError, Token};

use crate::{SettingsError, TokenStore};

/// Errors from the login guard.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not logged in; run `prismdrive login` or set PRISMDRIVE_TOKEN")]
    NotLoggedIn,

    #[error("stored token is unusable: {0}")]
    InvalidToken(#[from] ProtocolError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Where a command finds its token.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Explicit token (environment or flag); wins over the store.
    pub token_override: Option<String>,
    pub token_store: TokenStore,
}

impl AuthConfig {
    pub fn new(token_store: TokenStore) -> Self {
        Self {
            token_override: None,
            token_store,
        }
    }

    pub fn with_override(mut self, token: Option<String>) -> Self {
        self.token_override = token;
        self
    }
}

/// Resolves the token for a command, before any request is made.
pub fn require_token(auth: &AuthConfig) -> Result<Token, AuthError> {
    if let Some(raw) = auth
        .token_override
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
    {
        return Ok(Token::new(raw)?);
    }

    match auth.token_store.load()? {
        Some(raw) => Ok(Token::new(raw)?),
        None => Err(AuthError::NotLoggedIn),
    }
}
