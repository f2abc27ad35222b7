use std::sync::{Arc, Mutex, MutexGuard};

use time::macros::datetime;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::Error;
use crate::models::{NewReportRow, Report, ReportDraft, ReportStatus, ReportUpdate, Session};
use crate::session::{AuthEvent, SessionChange};

/// Identifies one load. Only the most recently issued ticket may apply its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The collection was replaced by this many rows.
    Applied(usize),
    /// A newer load or session change came in first; rows were dropped.
    Superseded,
}

struct SyncState {
    reports: Vec<Arc<Report>>,
    generation: u64,
}

/// In-memory report collection, kept in step with the remote store.
///
/// All writes go through `load_*`, `create_report` and `update_report`.
/// Entries are shared as `Arc`s; an update swaps in a new `Arc` for the
/// touched report and leaves every other entry as it was.
pub struct ReportSync {
    backend: Arc<dyn Backend>,
    state: Mutex<SyncState>,
}

impl ReportSync {
    /// Starts out with the demo reports shown before the first load.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_reports(backend, seed_reports())
    }

    pub fn with_reports(backend: Arc<dyn Backend>, reports: Vec<Report>) -> Self {
        ReportSync {
            backend,
            state: Mutex::new(SyncState {
                reports: reports.into_iter().map(Arc::new).collect(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reports(&self) -> Vec<Arc<Report>> {
        self.lock().reports.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().reports.is_empty()
    }

    pub fn select_report(&self, id: &str) -> Option<Arc<Report>> {
        self.lock().reports.iter().find(|r| r.id == id).cloned()
    }

    /// Issues a new ticket, superseding every load still in flight.
    pub fn begin_load(&self) -> LoadTicket {
        let mut state = self.lock();
        state.generation += 1;
        LoadTicket(state.generation)
    }

    /// Makes every in-flight load discard its result.
    pub fn invalidate(&self) {
        self.begin_load();
    }

    pub async fn load_from_remote(&self, session: &Session) -> Result<LoadOutcome, Error> {
        let ticket = self.begin_load();
        self.load_with_ticket(ticket, session).await
    }

    /// Fetches all rows and replaces the collection wholesale, unless `ticket`
    /// has been superseded by the time the rows arrive. On error the current
    /// collection is kept as is.
    pub async fn load_with_ticket(&self, ticket: LoadTicket, session: &Session) -> Result<LoadOutcome, Error> {
        let rows = match self.backend.list_reports(session).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "error fetching reports");
                return Err(Error::Load(e));
            }
        };

        let reports = match rows.into_iter().map(Report::try_from).collect::<Result<Vec<_>, _>>() {
            Ok(reports) => reports,
            Err(e) => {
                error!(error = %e, "fetched reports do not match the expected shape");
                return Err(Error::Load(e));
            }
        };

        let mut state = self.lock();
        if state.generation != ticket.0 {
            debug!(ticket = ticket.0, generation = state.generation, "discarding stale report load");
            return Ok(LoadOutcome::Superseded);
        }
        let count = reports.len();
        state.reports = reports.into_iter().map(Arc::new).collect();
        info!(rows = count, "reports loaded");
        Ok(LoadOutcome::Applied(count))
    }

    /// Validates the draft, inserts it remotely and prepends the stored row.
    /// Nothing changes locally unless the insert succeeded.
    pub async fn create_report(&self, draft: ReportDraft, session: Option<&Session>) -> Result<Arc<Report>, Error> {
        draft.validate()?;

        let payload = NewReportRow::from_draft(&draft, session.map(|s| s.user_id().to_string()));
        let row = match self.backend.insert_report(session, &payload).await {
            Ok(row) => row,
            Err(e) => {
                error!(error = %e, "error inserting report");
                return Err(Error::Persist(e));
            }
        };
        let report = Arc::new(Report::try_from(row).map_err(Error::Persist)?);

        let mut state = self.lock();
        // The stored row wins over anything already holding its id.
        state.reports.retain(|r| r.id != report.id);
        state.reports.insert(0, report.clone());
        drop(state);
        info!(report_id = %report.id, "report created");
        Ok(report)
    }

    /// Merges `update` into the matching report. Local only: the change is not
    /// written to the remote store and the next load replaces it.
    /// Returns whether a report with `id` existed.
    pub fn update_report(&self, id: &str, update: &ReportUpdate) -> bool {
        let mut state = self.lock();
        let Some(slot) = state.reports.iter_mut().find(|r| r.id == id) else {
            debug!(report_id = %id, "update for unknown report ignored");
            return false;
        };
        *slot = Arc::new(slot.with_update(update));
        debug!(report_id = %id, "report updated locally");
        true
    }

    /// Reacts to a session change: every sign-in or sign-out supersedes
    /// pending loads, and a new session starts a fresh load in the background.
    /// Token refreshes keep the current data and any load in flight.
    pub fn on_session_change(self: &Arc<Self>, change: &SessionChange) {
        if change.event == AuthEvent::TokenRefreshed {
            return;
        }
        let ticket = self.begin_load();
        let Some(session) = change.session.clone() else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("no async runtime; skipping report load");
                return;
            }
        };
        let this = Arc::clone(self);
        runtime.spawn(async move {
            // Errors are logged inside and otherwise not surfaced.
            let _ = this.load_with_ticket(ticket, &session).await;
        });
    }
}

/// Demo content shown until the first successful load. Ids are prefixed so
/// they never collide with ids handed out by the store.
pub fn seed_reports() -> Vec<Report> {
    vec![
        Report {
            id: "seed-1".into(),
            title: "Pump A-23 maintenance".into(),
            location: "Building A, basement".into(),
            description: "Routine maintenance of the main pump. Oil level checked and topped up.".into(),
            category: "maintenance".into(),
            photos: vec!["https://images.unsplash.com/photo-1581092160562-40aa08e78837?w=800&h=600&fit=crop".into()],
            tag_id: Some("NFC-A23-PUMP".into()),
            status: ReportStatus::Completed,
            created_at: datetime!(2025-11-01 10:30:00 UTC),
            assigned_to: Some("Max Müller".into()),
        },
        Report {
            id: "seed-2".into(),
            title: "Electrical distribution safety check".into(),
            location: "Building B, 2nd floor".into(),
            description: "Visual inspection and measurements carried out.".into(),
            category: "safety".into(),
            photos: vec![
                "https://images.unsplash.com/photo-1621905251918-48416bd8575a?w=800&h=600&fit=crop".into(),
                "https://images.unsplash.com/photo-1473341304170-971dccb5ac1e?w=800&h=600&fit=crop".into(),
            ],
            tag_id: Some("NFC-B2-ELEC".into()),
            status: ReportStatus::InProgress,
            created_at: datetime!(2025-11-02 14:15:00 UTC),
            assigned_to: Some("Sarah Schmidt".into()),
        },
        Report {
            id: "seed-3".into(),
            title: "Water leak".into(),
            location: "Building C, 1st floor".into(),
            description: "Small water leak found on the ceiling.".into(),
            category: "damage".into(),
            photos: vec!["https://images.unsplash.com/photo-1504309092620-4d0ec726efa4?w=800&h=600&fit=crop".into()],
            tag_id: None,
            status: ReportStatus::Open,
            created_at: datetime!(2025-11-03 09:45:00 UTC),
            assigned_to: None,
        },
    ]
}
