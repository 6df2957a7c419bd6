//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order matches time order. UUIDs are
//! stored as hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use merit_core::{
  achievement::ContentId,
  reference::{AchievementReference, Status, StatusChange, WorkflowState},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time at the precision the columns keep.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn encode_status(s: Status) -> &'static str {
  match s {
    Status::Draft => "draft",
    Status::Submitted => "submitted",
    Status::Verified => "verified",
    Status::Rejected => "rejected",
  }
}

pub fn decode_status(s: &str) -> Result<Status> {
  Status::from_str(s).map_err(|_| Error::Status(s.to_owned()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawReference::from_row`].
pub const REFERENCE_COLUMNS: &str = "reference_id, student_id, content_id, status, \
   submitted_at, verified_at, verified_by, rejection_note, created_at, updated_at";

/// Raw strings read directly from an `achievement_references` row.
pub struct RawReference {
  pub reference_id:   String,
  pub student_id:     String,
  pub content_id:     String,
  pub status:         String,
  pub submitted_at:   Option<String>,
  pub verified_at:    Option<String>,
  pub verified_by:    Option<String>,
  pub rejection_note: Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawReference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reference_id:   row.get(0)?,
      student_id:     row.get(1)?,
      content_id:     row.get(2)?,
      status:         row.get(3)?,
      submitted_at:   row.get(4)?,
      verified_at:    row.get(5)?,
      verified_by:    row.get(6)?,
      rejection_note: row.get(7)?,
      created_at:     row.get(8)?,
      updated_at:     row.get(9)?,
    })
  }

  pub fn into_reference(self) -> Result<AchievementReference> {
    Ok(AchievementReference {
      id:         decode_uuid(&self.reference_id)?,
      student_id: decode_uuid(&self.student_id)?,
      content_id: ContentId::new(self.content_id),
      workflow:   WorkflowState {
        status:         decode_status(&self.status)?,
        submitted_at:   decode_opt_dt(self.submitted_at)?,
        verified_at:    decode_opt_dt(self.verified_at)?,
        verified_by:    decode_opt_uuid(self.verified_by)?,
        rejection_note: self.rejection_note,
      },
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `status_changes` row.
pub struct RawStatusChange {
  pub reference_id: String,
  pub from_status:  Option<String>,
  pub to_status:    String,
  pub actor:        String,
  pub note:         Option<String>,
  pub changed_at:   String,
}

impl RawStatusChange {
  pub fn into_change(self) -> Result<StatusChange> {
    Ok(StatusChange {
      reference_id: decode_uuid(&self.reference_id)?,
      from:         self.from_status.as_deref().map(decode_status).transpose()?,
      to:           decode_status(&self.to_status)?,
      actor:        decode_uuid(&self.actor)?,
      note:         self.note,
      at:           decode_dt(&self.changed_at)?,
    })
  }
}
