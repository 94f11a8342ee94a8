use std::fmt;

use serde::{Deserialize, Serialize};

use crate::envelope::ProtocolError;

/// Bearer token issued by the login endpoint.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wraps a raw token string.
    ///
    /// Surrounding whitespace is trimmed. Rejects empty tokens and tokens
    /// that cannot be sent in an HTTP header.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ProtocolError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidToken("empty token".into()));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ProtocolError::InvalidToken(
                "token contains non-printable characters".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw token for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// A remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl FileEntry {
    /// Returns `true` for folder entries.
    pub fn is_folder(&self) -> bool {
        self.entry_type.as_deref() == Some("folder")
    }
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: String,
}

/// Answer of `POST /auth/login`. Only the token is used.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<LoginUser>,
}

/// User object inside [`LoginResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /api/v1/folders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
}

/// Body of `PUT /api/v1/file-entries/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdateEntryRequest {
    /// Returns `true` when no field would be changed.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}
