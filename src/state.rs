use std::sync::{Arc, Mutex};

use tracing::info;

use crate::backend::{select_backend, Backend};
use crate::config::BackendConfig;
use crate::db::LocalDb;
use crate::error::Error;
use crate::models::{Report, ReportDraft, ReportUpdate, Session};
use crate::session::{SessionGate, Subscription};
use crate::sync::ReportSync;

/// Everything the presentation layer talks to, created once at startup.
///
/// While attached, every session change is forwarded to the report model,
/// which reloads on sign-in. Dropping the state detaches it and discards
/// any load still in flight.
pub struct AppState {
    config: BackendConfig,
    backend: Arc<dyn Backend>,
    db: Option<LocalDb>,
    gate: Arc<SessionGate>,
    reports: Arc<ReportSync>,
    subscription: Mutex<Option<Subscription>>,
}

impl AppState {
    /// Opens the local database, reads backend settings from it and selects the backend.
    pub fn open(db: LocalDb) -> Result<Self, Error> {
        db.init()?;
        let settings = db.get_settings()?;
        let config = BackendConfig::from_settings(&settings);
        let backend = select_backend(&config);
        Ok(Self::with_backend(config, backend, Some(db)))
    }

    pub fn with_backend(config: BackendConfig, backend: Arc<dyn Backend>, db: Option<LocalDb>) -> Self {
        let gate = Arc::new(SessionGate::new(backend.clone(), db.clone()));
        let reports = Arc::new(ReportSync::new(backend.clone()));
        let state = AppState {
            config,
            backend,
            db,
            gate,
            reports,
            subscription: Mutex::new(None),
        };
        state.attach();
        state
    }

    fn attach(&self) {
        let reports = Arc::clone(&self.reports);
        let subscription = self.gate.subscribe(move |change| reports.on_session_change(change));
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    /// Restores a previous session, which also triggers the first load.
    pub async fn start(&self) -> Option<Session> {
        info!(backend = self.backend.name(), "starting");
        self.gate.get_current_session().await
    }

    /// Stops following session changes and drops any pending load.
    pub fn shutdown(&self) {
        let subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(subscription);
        self.reports.invalidate();
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn db(&self) -> Option<&LocalDb> {
        self.db.as_ref()
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    pub fn reports(&self) -> &ReportSync {
        &self.reports
    }

    /// Creates a report on behalf of whoever is signed in right now.
    pub async fn create_report(&self, draft: ReportDraft) -> Result<Arc<Report>, Error> {
        let session = self.gate.current();
        self.reports.create_report(draft, session.as_ref()).await
    }

    pub fn update_report(&self, id: &str, update: &ReportUpdate) -> bool {
        self.reports.update_report(id, update)
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
