use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::models::{Session, SettingInput};

#[derive(Debug, Error)]
pub enum DbError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Local app database: settings and the persisted auth session.
#[derive(Debug, Clone)]
pub struct LocalDb {
  db_path: PathBuf,
}

impl LocalDb {
  pub fn open_in(app_data: &Path) -> Result<Self, DbError> {
    std::fs::create_dir_all(app_data)?;
    let db = LocalDb { db_path: app_data.join("rapport.sqlite") };
    db.init()?;
    Ok(db)
  }

  pub fn path(&self) -> &Path {
    &self.db_path
  }

  pub fn connect(&self) -> Result<Connection, DbError> {
    let conn = Connection::open(&self.db_path)?;
    Ok(conn)
  }

  pub fn init(&self) -> Result<(), DbError> {
    let conn = self.connect()?;
    // Each migration uses IF NOT EXISTS, so reapplying is a no-op.
    conn.execute_batch(include_str!("../migrations/001_settings.sql"))?;
    conn.execute_batch(include_str!("../migrations/002_auth_session.sql"))?;
    Ok(())
  }

  pub fn get_settings(&self) -> Result<HashMap<String, String>, DbError> {
    let conn = self.connect()?;
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;

    let mut out = HashMap::new();
    for row in rows {
      let (key, value) = row?;
      out.insert(key, value);
    }
    Ok(out)
  }

  pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
    let conn = self.connect()?;
    let value = conn
      .query_row("SELECT value FROM settings WHERE key = ?1", [key], |r| r.get(0))
      .optional()?;
    Ok(value)
  }

  pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
    let conn = self.connect()?;
    conn.execute(
      "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
       ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
      (key, value, &now_iso())
    )?;
    Ok(())
  }

  pub fn set_settings(&self, pairs: &[SettingInput]) -> Result<(), DbError> {
    let mut conn = self.connect()?;
    let tx = conn.transaction()?;
    let updated_at = now_iso();

    for pair in pairs {
      tx.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        (&pair.key, &pair.value, &updated_at)
      )?;
    }

    tx.commit()?;
    Ok(())
  }

  pub fn load_session(&self) -> Result<Option<Session>, DbError> {
    let conn = self.connect()?;
    let json: Option<String> = conn
      .query_row("SELECT session_json FROM auth_session WHERE id = 1", [], |r| r.get(0))
      .optional()?;
    match json {
      Some(json) => Ok(Some(serde_json::from_str(&json)?)),
      None => Ok(None),
    }
  }

  pub fn save_session(&self, session: &Session) -> Result<(), DbError> {
    let conn = self.connect()?;
    let json = serde_json::to_string(session)?;
    conn.execute(
      "INSERT INTO auth_session (id, session_json, updated_at) VALUES (1, ?1, ?2)
       ON CONFLICT(id) DO UPDATE SET session_json=excluded.session_json, updated_at=excluded.updated_at",
      (&json, &now_iso())
    )?;
    Ok(())
  }

  pub fn clear_session(&self) -> Result<(), DbError> {
    let conn = self.connect()?;
    conn.execute("DELETE FROM auth_session", [])?;
    Ok(())
  }
}

fn now_iso() -> String {
  let t = time::OffsetDateTime::now_utc();
  t.format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
