use serde::{Deserialize, Serialize};

use crate::models::{Session, User};

#[derive(Debug, Clone, Serialize)]
pub struct PasswordCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshTokenGrant<'a> {
    pub refresh_token: &'a str,
}

/// Token grant returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    pub fn into_session(self) -> Session {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|secs| time::OffsetDateTime::now_utc().unix_timestamp() + secs)
        });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user,
        }
    }
}

/// Error payload shapes of the auth service and the REST layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
            .filter(|m| !m.is_empty())
    }

    /// Human-readable message for an error response body.
    pub fn message_from(text: &str, status: u16) -> String {
        serde_json::from_str::<ErrorBody>(text)
            .ok()
            .and_then(ErrorBody::into_message)
            .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| format!("request failed with status {}", status))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend not configured. Set supabase_url and supabase_anon_key (or RAPPORT_SUPABASE_URL and RAPPORT_SUPABASE_ANON_KEY).")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Timeout")]
    Timeout,
    #[error("Unexpected row shape: {0}")]
    Mapping(String),
}
