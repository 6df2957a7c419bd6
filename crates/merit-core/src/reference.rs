//! Achievement references: the relational half of an achievement.
//!
//! A reference is authoritative for workflow state. It carries the owner, the
//! pointer into the content store and the approval status. References are
//! never hard-deleted; deletion leaves a tombstone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::achievement::ContentId;

/// Approval status of an achievement.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
  Draft,
  Submitted,
  Verified,
  Rejected,
}

impl Status {
  /// Whether the owner may still change content in this status.
  pub fn is_editable(self) -> bool { matches!(self, Self::Draft | Self::Rejected) }
}

/// The workflow fields of a reference. Only the state machine in
/// [`crate::workflow`] produces new values of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
  pub status:         Status,
  pub submitted_at:   Option<DateTime<Utc>>,
  pub verified_at:    Option<DateTime<Utc>>,
  /// User id of the validator who last moved the record out of `submitted`.
  pub verified_by:    Option<Uuid>,
  pub rejection_note: Option<String>,
}

impl WorkflowState {
  /// The state of a freshly created reference.
  pub fn draft() -> Self {
    Self {
      status:         Status::Draft,
      submitted_at:   None,
      verified_at:    None,
      verified_by:    None,
      rejection_note: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementReference {
  pub id:         Uuid,
  pub student_id: Uuid,
  pub content_id: ContentId,
  #[serde(flatten)]
  pub workflow:   WorkflowState,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl AchievementReference {
  pub fn status(&self) -> Status { self.workflow.status }
}

/// Input to [`crate::store::ReferenceStore::insert_reference`]. The caller
/// picks the id so an insert with an unknown outcome can be looked up
/// afterwards; the store assigns the audit timestamps. Every new reference
/// starts in `draft`.
#[derive(Debug, Clone)]
pub struct NewReference {
  pub id:         Uuid,
  pub student_id: Uuid,
  pub content_id: ContentId,
  /// Who created the record; recorded in the initial history entry.
  pub actor:      Uuid,
}

/// One immutable entry in a reference's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
  pub reference_id: Uuid,
  /// `None` for the entry written at creation.
  pub from:         Option<Status>,
  pub to:           Status,
  pub actor:        Uuid,
  pub note:         Option<String>,
  pub at:           DateTime<Utc>,
}
