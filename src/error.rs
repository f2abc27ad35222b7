use thiserror::Error;

use crate::backend::BackendError;
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum Error {
  /// Required form fields are missing; nothing was sent or stored.
  #[error("{0}")]
  Validation(String),
  #[error("failed to load reports: {0}")]
  Load(#[source] BackendError),
  #[error("error while saving: {0}")]
  Persist(#[source] BackendError),
  #[error("{0}")]
  Auth(#[source] BackendError),
  #[error("local storage error: {0}")]
  Storage(#[from] DbError),
}

impl Error {
  pub fn code(&self) -> &'static str {
    match self {
      Error::Validation(_) => "VALIDATION_ERROR",
      Error::Load(_) => "LOAD_ERROR",
      Error::Persist(_) => "PERSIST_ERROR",
      Error::Auth(_) => "AUTH_ERROR",
      Error::Storage(_) => "STORAGE_ERROR",
    }
  }
}
