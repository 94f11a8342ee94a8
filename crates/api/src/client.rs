//! PrismDrive API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use std::path::{Path, PathBuf};

use prismdrive_protocol::constants::{
    FIELD_FILE, FIELD_PARENT_ID, FIELD_RELATIVE_PATH, FILE_ENTRIES_ENDPOINT, FOLDERS_ENDPOINT,
    LOGIN_ENDPOINT, OCTET_STREAM, UPLOADS_ENDPOINT, USER_AGENT, join_url,
};
use prismdrive_protocol::{
    ApiErrorBody, CreateFolderRequest, FileEntry, LoginRequest, LoginResponse, ProtocolError,
    Token, UpdateEntryRequest, decode_entry, summarize_error,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use tracing::debug;

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("nothing to update: give a new name or description")]
    NothingToUpdate,

    #[error("login response did not contain an access token")]
    MissingToken,

    #[error("token cannot be sent in a header")]
    InvalidToken,
}

impl ApiError {
    /// `true` when the caller should log in again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }
}

/// PrismDrive API client.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for `base_url`, authenticated when `token` is given.
    pub fn new(base_url: impl Into<String>, token: Option<&Token>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    /// Sends a request and returns the body of a 2xx response.
    async fn execute(&self, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = request.send().await?;
        let status = resp.status();
        debug!(status = status.as_u16(), url = %resp.url(), "response received");

        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Exchanges credentials for a token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_name: &str,
    ) -> Result<Token, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            device_name: device_name.to_string(),
        };
        debug!(email, device_name, "logging in");
        let bytes = self
            .execute(self.http.post(self.url(LOGIN_ENDPOINT)).json(&body))
            .await?;

        let resp: LoginResponse = serde_json::from_slice(&bytes)?;
        let raw = resp
            .user
            .and_then(|user| user.access_token)
            .ok_or(ApiError::MissingToken)?;
        Ok(Token::new(raw)?)
    }

    /// Uploads a whole file in one buffered multipart request.
    pub async fn upload_file(
        &self,
        path: &Path,
        parent_id: Option<u64>,
        relative_path: Option<&str>,
    ) -> Result<FileEntry, ApiError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::FileNotFound(path.to_path_buf()))?;
        debug!(file = %file_name, bytes = data.len(), "buffered upload");

        let mut form = Form::new();
        if let Some(parent_id) = parent_id {
            form = form.text(FIELD_PARENT_ID, parent_id.to_string());
        }
        if let Some(relative_path) = relative_path {
            form = form.text(FIELD_RELATIVE_PATH, relative_path.to_string());
        }
        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(OCTET_STREAM)?;
        let form = form.part(FIELD_FILE, part);

        let bytes = self
            .execute(self.http.post(self.url(UPLOADS_ENDPOINT)).multipart(form))
            .await?;
        Ok(decode_entry(&bytes)?)
    }

    /// Creates a folder under `parent_id` (root when `None`).
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<FileEntry, ApiError> {
        let body = CreateFolderRequest {
            name: name.to_string(),
            parent_id,
        };
        let bytes = self
            .execute(self.http.post(self.url(FOLDERS_ENDPOINT)).json(&body))
            .await?;
        Ok(decode_entry(&bytes)?)
    }

    /// Renames an entry and/or changes its description.
    pub async fn update_entry(
        &self,
        entry_id: u64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<FileEntry, ApiError> {
        let body = UpdateEntryRequest {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        };
        if body.is_empty() {
            return Err(ApiError::NothingToUpdate);
        }

        let url = self.url(&format!("{FILE_ENTRIES_ENDPOINT}/{entry_id}"));
        let bytes = self.execute(self.http.put(url).json(&body)).await?;
        Ok(decode_entry(&bytes)?)
    }
}

/// Maps a non-2xx response onto an [`ApiError`].
fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let code = status.as_u16();
    let mut message = summarize_error(code, body);
    if let Some(parsed) = ApiErrorBody::parse(body) {
        let fields = parsed.field_errors();
        if parsed.message.is_some() && !fields.is_empty() {
            message = format!("{message} ({})", fields.join("; "));
        }
    }

    if status == StatusCode::UNAUTHORIZED {
        ApiError::Unauthorized(message)
    } else {
        ApiError::Api {
            status: code,
            message,
        }
    }
}
