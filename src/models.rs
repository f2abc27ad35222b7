use serde::{Deserialize, Deserializer, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::backend::BackendError;
use crate::error::Error;

pub type ID = String;

pub const CATEGORIES: [&str; 6] = ["maintenance", "safety", "damage", "inspection", "cleaning", "other"];
pub const DEFAULT_CATEGORY: &str = "maintenance";

/// Lifecycle status of a report. Older rows carry the German labels; they
/// are read but never written.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportStatus {
  #[default]
  #[serde(rename = "open", alias = "offen")]
  Open,
  #[serde(rename = "in-progress", alias = "in-bearbeitung")]
  InProgress,
  #[serde(rename = "completed", alias = "abgeschlossen")]
  Completed,
}

impl ReportStatus {
  pub const ALL: [ReportStatus; 3] = [ReportStatus::Open, ReportStatus::InProgress, ReportStatus::Completed];

  pub fn as_str(&self) -> &'static str {
    match self {
      ReportStatus::Open => "open",
      ReportStatus::InProgress => "in-progress",
      ReportStatus::Completed => "completed",
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub id: ID,
  pub title: String,
  pub location: String,
  pub description: String,
  pub category: String,
  pub photos: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag_id: Option<String>,
  pub status: ReportStatus,
  #[serde(with = "time::serde::rfc3339")]
  pub created_at: OffsetDateTime,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
}

impl Report {
  /// Copy of this report with the update's fields overwritten.
  pub fn with_update(&self, update: &ReportUpdate) -> Report {
    let mut next = self.clone();
    if let Some(status) = update.status {
      next.status = status;
    }
    if let Some(assigned_to) = &update.assigned_to {
      next.assigned_to = assigned_to.clone();
    }
    next
  }
}

/// Partial update applied from the detail view. `assigned_to: Some(None)` clears the assignee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportUpdate {
  pub status: Option<ReportStatus>,
  pub assigned_to: Option<Option<String>>,
}

impl ReportUpdate {
  pub fn status(mut self, status: ReportStatus) -> Self {
    self.status = Some(status);
    self
  }

  pub fn assigned_to(mut self, assigned_to: Option<String>) -> Self {
    self.assigned_to = Some(assigned_to);
    self
  }
}

/// Form state of a report that has not been submitted yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDraft {
  pub title: String,
  pub location: String,
  pub description: String,
  pub category: String,
  pub photos: Vec<String>,
  pub tag_id: Option<String>,
}

impl Default for ReportDraft {
  fn default() -> Self {
    ReportDraft {
      title: String::new(),
      location: String::new(),
      description: String::new(),
      category: DEFAULT_CATEGORY.to_string(),
      photos: vec![],
      tag_id: None,
    }
  }
}

impl ReportDraft {
  pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
    ReportDraft {
      title: title.into(),
      location: location.into(),
      ..Default::default()
    }
  }

  pub fn add_photo(&mut self, reference: impl Into<String>) {
    self.photos.push(reference.into());
  }

  pub fn remove_photo(&mut self, index: usize) -> Option<String> {
    if index < self.photos.len() {
      Some(self.photos.remove(index))
    } else {
      None
    }
  }

  /// A new scan replaces the previous tag; an empty value clears it.
  pub fn set_tag(&mut self, tag: impl Into<String>) {
    let tag = tag.into();
    self.tag_id = if tag.is_empty() { None } else { Some(tag) };
  }

  pub fn validate(&self) -> Result<(), Error> {
    if self.title.is_empty() || self.location.is_empty() {
      return Err(Error::Validation("Please fill in at least title and location.".to_string()));
    }
    Ok(())
  }
}

/// Row of the remote `reports` table as returned by the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportRow {
  #[serde(deserialize_with = "string_or_number")]
  pub id: ID,
  pub title: String,
  pub location: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub photos: Option<Vec<String>>,
  #[serde(default)]
  pub nfc_tag: Option<String>,
  pub status: ReportStatus,
  pub category: String,
  pub created_at: String,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(default)]
  pub assigned_to: Option<String>,
}

impl TryFrom<ReportRow> for Report {
  type Error = BackendError;

  fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
    if row.id.is_empty() {
      return Err(BackendError::Mapping("report row without id".to_string()));
    }
    let created_at = OffsetDateTime::parse(&row.created_at, &Rfc3339)
      .map_err(|e| BackendError::Mapping(format!("report {}: bad created_at {:?}: {}", row.id, row.created_at, e)))?;

    Ok(Report {
      id: row.id,
      title: row.title,
      location: row.location,
      description: row.description.unwrap_or_default(),
      category: row.category,
      photos: row.photos.unwrap_or_default(),
      tag_id: row.nfc_tag.filter(|t| !t.is_empty()),
      status: row.status,
      created_at,
      assigned_to: row.assigned_to,
    })
  }
}

/// Insert payload for the `reports` table. `id` and `created_at` are assigned remotely.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewReportRow {
  pub title: String,
  pub location: String,
  pub description: String,
  pub category: String,
  pub photos: Vec<String>,
  pub nfc_tag: Option<String>,
  pub status: ReportStatus,
  pub assigned_to: Option<String>,
  pub user_id: Option<String>,
}

impl NewReportRow {
  pub fn from_draft(draft: &ReportDraft, user_id: Option<String>) -> Self {
    NewReportRow {
      title: draft.title.clone(),
      location: draft.location.clone(),
      description: draft.description.clone(),
      category: draft.category.clone(),
      photos: draft.photos.clone(),
      nfc_tag: draft.tag_id.clone().filter(|t| !t.is_empty()),
      status: ReportStatus::Open,
      assigned_to: None,
      user_id,
    }
  }
}

impl From<&Report> for NewReportRow {
  fn from(report: &Report) -> Self {
    NewReportRow {
      title: report.title.clone(),
      location: report.location.clone(),
      description: report.description.clone(),
      category: report.category.clone(),
      photos: report.photos.clone(),
      nfc_tag: report.tag_id.clone(),
      status: report.status,
      assigned_to: report.assigned_to.clone(),
      user_id: None,
    }
  }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
  pub id: ID,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: String,
  pub token_type: String,
  /// Unix seconds.
  pub expires_at: Option<i64>,
  pub user: User,
}

const EXPIRY_MARGIN_SECS: i64 = 10;

impl Session {
  pub fn user_id(&self) -> &str {
    &self.user.id
  }

  pub fn is_expired(&self) -> bool {
    match self.expires_at {
      Some(at) => OffsetDateTime::now_utc().unix_timestamp() + EXPIRY_MARGIN_SECS >= at,
      None => false,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct SettingInput {
  pub key: String,
  pub value: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(i64),
  }

  Ok(match Raw::deserialize(deserializer)? {
    Raw::Text(s) => s,
    Raw::Number(n) => n.to_string(),
  })
}
