pub mod client;
pub mod null;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::models::{NewReportRow, ReportRow, Session};

pub use client::SupabaseBackend;
pub use null::NullBackend;
pub use types::BackendError;

/// Auth service plus the remote `reports` store.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// `Ok(None)` when the account still has to be confirmed by email.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError>;

    /// All visible rows, newest first.
    async fn list_reports(&self, session: &Session) -> Result<Vec<ReportRow>, BackendError>;

    /// Inserts one row and returns it as stored, with `id` and `created_at` filled in.
    async fn insert_report(&self, session: Option<&Session>, row: &NewReportRow) -> Result<ReportRow, BackendError>;
}

/// Picks the backend once at startup. Missing configuration degrades to [`NullBackend`].
pub fn select_backend(config: &BackendConfig) -> Arc<dyn Backend> {
    if !config.is_configured() {
        tracing::warn!("supabase url or anon key not set; running without a backend");
        return Arc::new(NullBackend);
    }
    match SupabaseBackend::new(config.clone()) {
        Ok(backend) => {
            tracing::info!(url = %config.supabase_url, "using supabase backend");
            Arc::new(backend)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to build supabase client; running without a backend");
            Arc::new(NullBackend)
        }
    }
}
