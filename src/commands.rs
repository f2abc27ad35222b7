//! Entry points for the presentation layer. Errors come back as
//! `"[CODE] message"` strings ready to show to the user.

use serde::Serialize;

use crate::error::Error;
use crate::models::*;
use crate::queries::{self, Dashboard, ReportFilter, StatusCounts};
use crate::state::AppState;

fn display(e: Error) -> String {
  format!("[{}] {}", e.code(), e)
}

#[derive(Debug, Serialize)]
pub struct ReportList {
  pub reports: Vec<Report>,
  pub counts: StatusCounts,
}

pub fn backend_health(state: &AppState) -> serde_json::Value {
  serde_json::json!({
    "backend": state.backend_name(),
    "configured": state.config().is_configured(),
    "authenticated": state.gate().is_authenticated(),
  })
}

pub async fn sign_in(state: &AppState, email: String, password: String) -> Result<User, String> {
  let session = state.gate().sign_in(&email, &password).await.map_err(display)?;
  Ok(session.user)
}

/// `None` means the account exists but still has to be confirmed by email.
pub async fn sign_up(state: &AppState, email: String, password: String) -> Result<Option<User>, String> {
  let session = state.gate().sign_up(&email, &password).await.map_err(display)?;
  Ok(session.map(|s| s.user))
}

pub async fn sign_out(state: &AppState) {
  state.gate().sign_out().await
}

pub fn current_user(state: &AppState) -> Option<User> {
  state.gate().current().map(|s| s.user)
}

pub fn list_reports(state: &AppState, query: Option<String>, status: Option<ReportStatus>) -> ReportList {
  let all = state.reports().reports();
  let filter = ReportFilter { query: query.unwrap_or_default(), status };
  ReportList {
    reports: queries::filter_reports(&all, &filter).iter().map(|r| (**r).clone()).collect(),
    counts: queries::status_counts(&all),
  }
}

pub fn get_dashboard(state: &AppState) -> Dashboard {
  queries::dashboard(&state.reports().reports())
}

pub fn get_report(state: &AppState, report_id: String) -> Option<Report> {
  state.reports().select_report(&report_id).map(|r| (*r).clone())
}

pub async fn create_report(state: &AppState, draft: ReportDraft) -> Result<Report, String> {
  let report = state.create_report(draft).await.map_err(display)?;
  Ok((*report).clone())
}

/// Saves the detail view's edit form. An empty assignee clears it.
pub fn update_report(state: &AppState, report_id: String, status: ReportStatus, assigned_to: String) -> Result<(), String> {
  let assigned_to = if assigned_to.is_empty() { None } else { Some(assigned_to) };
  let update = ReportUpdate::default().status(status).assigned_to(assigned_to);
  if state.update_report(&report_id, &update) {
    Ok(())
  } else {
    Err(format!("Report not found: {}", report_id))
  }
}

pub fn categories() -> Vec<&'static str> {
  CATEGORIES.to_vec()
}

// Settings are read once at startup; backend changes apply on the next launch.
pub fn get_settings(state: &AppState) -> Result<Vec<(String, String)>, String> {
  let Some(db) = state.db() else {
    return Ok(vec![]);
  };
  let mut out: Vec<_> = db.get_settings().map_err(|e| display(e.into()))?.into_iter().collect();
  out.sort();
  Ok(out)
}

pub fn set_settings(state: &AppState, pairs: Vec<SettingInput>) -> Result<(), String> {
  let Some(db) = state.db() else {
    return Err("No local database".to_string());
  };
  db.set_settings(&pairs).map_err(|e| display(e.into()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use crate::backend::fake::{session, stored, FakeBackend};
  use crate::backend::BackendError;
  use crate::config::BackendConfig;
  use crate::db::LocalDb;
  use tempfile::TempDir;

  fn state(backend: Arc<FakeBackend>) -> AppState {
    AppState::with_backend(BackendConfig::default(), backend, None)
  }

  #[tokio::test]
  async fn test_validation_error_message() {
    let s = state(Arc::new(FakeBackend::default()));
    let err = create_report(&s, ReportDraft::new("", "Building C")).await.unwrap_err();
    assert_eq!(err, "[VALIDATION_ERROR] Please fill in at least title and location.");
  }

  #[tokio::test]
  async fn test_create_then_read_back() {
    let backend = Arc::new(FakeBackend::default());
    let s = state(backend.clone());
    let draft = ReportDraft { title: "Leak".into(), location: "Building C".into(), ..Default::default() };
    let payload = NewReportRow::from_draft(&draft, None);
    backend.push_insert(Ok(stored("srv-9", "2025-11-06T12:00:00Z", &payload)));

    let created = create_report(&s, draft).await.unwrap();
    assert_eq!(created.status, ReportStatus::Open);
    assert_eq!(created.category, "maintenance");
    assert_eq!(get_report(&s, "srv-9".into()), Some(created.clone()));
    assert_eq!(get_dashboard(&s).recent[0].id, "srv-9");
    assert_eq!(list_reports(&s, None, None).reports[0], created);
  }

  #[tokio::test]
  async fn test_sign_in_error_is_reported() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_sign_in(Err(BackendError::Api { status: 400, message: "Invalid login credentials".into() }));
    let s = state(backend);
    let err = sign_in(&s, "a@b.ch".into(), "x".into()).await.unwrap_err();
    assert_eq!(err, "[AUTH_ERROR] Invalid login credentials");
    assert_eq!(current_user(&s), None);
  }

  #[tokio::test]
  async fn test_sign_in_returns_user() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_sign_in(Ok(session("user-7")));
    let s = state(backend);
    let user = sign_in(&s, "user-7@example.ch".into(), "pw".into()).await.unwrap();
    assert_eq!(user.id, "user-7");
    assert_eq!(current_user(&s), Some(user));
    assert_eq!(backend_health(&s)["authenticated"], true);
  }

  #[test]
  fn test_update_report_form() {
    let s = state(Arc::new(FakeBackend::default()));

    update_report(&s, "seed-3".into(), ReportStatus::InProgress, "Ana".into()).unwrap();
    let r = get_report(&s, "seed-3".into()).unwrap();
    assert_eq!(r.status, ReportStatus::InProgress);
    assert_eq!(r.assigned_to.as_deref(), Some("Ana"));

    update_report(&s, "seed-3".into(), ReportStatus::InProgress, String::new()).unwrap();
    assert_eq!(get_report(&s, "seed-3".into()).unwrap().assigned_to, None);

    assert!(update_report(&s, "404".into(), ReportStatus::Open, String::new()).is_err());
  }

  #[test]
  fn test_list_filters() {
    let s = state(Arc::new(FakeBackend::default()));
    let list = list_reports(&s, Some("building".into()), Some(ReportStatus::Completed));
    assert_eq!(list.reports.len(), 1);
    assert_eq!(list.counts.total, 3);
    assert_eq!(categories().len(), 6);
  }

  #[test]
  fn test_settings_roundtrip() {
    let temp = TempDir::new().unwrap();
    let db = LocalDb::open_in(temp.path()).unwrap();
    let s = AppState::with_backend(BackendConfig::default(), Arc::new(FakeBackend::default()), Some(db));

    set_settings(&s, vec![
      SettingInput { key: "supabase_url".into(), value: "https://x.supabase.co".into() },
      SettingInput { key: "supabase_anon_key".into(), value: "anon".into() },
    ]).unwrap();
    let settings = get_settings(&s).unwrap();
    assert_eq!(settings[0], ("supabase_anon_key".to_string(), "anon".to_string()));
    assert_eq!(settings.len(), 2);
  }
}
