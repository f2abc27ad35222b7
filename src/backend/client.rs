use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::types::*;
use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::models::{NewReportRow, ReportRow, Session};

const REPORTS_TABLE: &str = "reports";

/// Supabase-hosted auth and report store, spoken to over its REST API.
pub struct SupabaseBackend {
    http: Client,
    config: BackendConfig,
}

impl SupabaseBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        if !config.is_configured() {
            return Err(BackendError::NotConfigured);
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self { http, config })
    }

    fn base(&self) -> &str {
        self.config.supabase_url.trim_end_matches('/')
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base(), table)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base(), path)
    }

    /// `apikey` always carries the anon key; the bearer is the user's token when signed in.
    pub(crate) fn headers(&self, access_token: Option<&str>) -> Result<HeaderMap, BackendError> {
        let bearer = access_token.unwrap_or(&self.config.anon_key);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), header_value(&self.config.anon_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(BackendError::Api {
            status: status.as_u16(),
            message: ErrorBody::message_from(&error_text, status.as_u16()),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::InvalidResponse(e.to_string())
            }
        })
    }

    async fn token_grant<B: serde::Serialize + Sync>(&self, grant_type: &str, body: &B) -> Result<Session, BackendError> {
        let url = self.auth_url(&format!("token?grant_type={}", grant_type));
        let request = self.http.post(url).headers(self.headers(None)?).json(body);
        let token: TokenResponse = self.send_json(request).await?;
        Ok(token.into_session())
    }

    pub(crate) fn sign_up_request(&self, email: &str, password: &str) -> Result<RequestBuilder, BackendError> {
        Ok(self
            .http
            .post(self.auth_url("signup"))
            .headers(self.headers(None)?)
            .json(&PasswordCredentials { email, password }))
    }

    /// Newest first, every column.
    pub(crate) fn list_request(&self, session: &Session) -> Result<RequestBuilder, BackendError> {
        let url = format!("{}?select=*&order=created_at.desc", self.rest_url(REPORTS_TABLE));
        Ok(self.http.get(url).headers(self.headers(Some(&session.access_token))?))
    }

    pub(crate) fn insert_request(&self, session: Option<&Session>, row: &NewReportRow) -> Result<RequestBuilder, BackendError> {
        let mut headers = self.headers(session.map(|s| s.access_token.as_str()))?;
        headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static("return=representation"));
        // Ask for a single object rather than a one-element array.
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.pgrst.object+json"));

        Ok(self.http.post(self.rest_url(REPORTS_TABLE)).headers(headers).json(row))
    }
}

/// Without auto-confirm the service answers a signup with the bare user and no tokens.
fn signup_session(body: Value) -> Result<Option<Session>, BackendError> {
    if body.get("access_token").is_none() {
        return Ok(None);
    }
    let token: TokenResponse =
        serde_json::from_value(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
    Ok(Some(token.into_session()))
}

#[async_trait]
impl Backend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.token_grant("password", &PasswordCredentials { email, password }).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let body: Value = self.send_json(self.sign_up_request(email, password)?).await?;
        signup_session(body)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.token_grant("refresh_token", &RefreshTokenGrant { refresh_token }).await
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.auth_url("logout"))
            .headers(self.headers(Some(&session.access_token))?);
        self.send(request).await?;
        Ok(())
    }

    async fn list_reports(&self, session: &Session) -> Result<Vec<ReportRow>, BackendError> {
        self.send_json(self.list_request(session)?).await
    }

    async fn insert_report(&self, session: Option<&Session>, row: &NewReportRow) -> Result<ReportRow, BackendError> {
        self.send_json(self.insert_request(session, row)?).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BackendError> {
    value
        .parse::<HeaderValue>()
        .map_err(|e| BackendError::Http(format!("invalid header value: {}", e)))
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Http(e.to_string())
    }
}
