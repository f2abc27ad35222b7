use async_trait::async_trait;

use crate::backend::{Backend, BackendError};
use crate::models::{NewReportRow, ReportRow, Session};

/// Stand-in used when no backend is configured. Never yields a session, so
/// nothing downstream ever asks it for data; reads come back empty, writes fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<Session, BackendError> {
        Err(BackendError::NotConfigured)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<Session>, BackendError> {
        Err(BackendError::NotConfigured)
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, BackendError> {
        Err(BackendError::NotConfigured)
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), BackendError> {
        Ok(())
    }

    async fn list_reports(&self, _session: &Session) -> Result<Vec<ReportRow>, BackendError> {
        Ok(vec![])
    }

    async fn insert_report(&self, _session: Option<&Session>, _row: &NewReportRow) -> Result<ReportRow, BackendError> {
        Err(BackendError::NotConfigured)
    }
}
