pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queries;
pub mod session;
pub mod state;
pub mod sync;

pub use backend::{select_backend, Backend, BackendError, NullBackend, SupabaseBackend};
pub use config::BackendConfig;
pub use db::LocalDb;
pub use error::Error;
pub use models::{Report, ReportDraft, ReportStatus, ReportUpdate, Session, User};
pub use session::{AuthEvent, SessionChange, SessionGate, Subscription};
pub use state::AppState;
pub use sync::{LoadOutcome, ReportSync};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
