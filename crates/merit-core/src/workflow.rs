//! The approval state machine.
//!
//! `draft → submitted → {verified | rejected}`, `rejected → draft`;
//! `verified` is terminal. Transitions are pure: they take the current
//! [`WorkflowState`] and return the next one (or the guard that failed).
//! Nothing else in the crate constructs a changed workflow state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::Guard,
  reference::{Status, WorkflowState},
};

/// A rejection reason that is known to be non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionNote(String);

impl RejectionNote {
  pub fn parse(note: Option<String>) -> Result<Self> {
    match note.as_deref().map(str::trim) {
      Some(n) if !n.is_empty() => Ok(Self(n.to_owned())),
      _ => Err(Error::Validation("a rejection note is required".into())),
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  /// Owner edits title, description, details, tags or points.
  Edit,
  /// Owner appends an attachment.
  Attach,
  /// Owner submits for review.
  Submit { attachments: usize },
  Verify { validator: Uuid },
  Reject { validator: Uuid, note: RejectionNote },
  /// Owner deletes the achievement.
  Delete,
}

/// Apply `transition` to `current`.
///
/// Returns `Ok(None)` when the guard passes but the workflow fields do not
/// change (editing a draft, attaching, deleting), and `Ok(Some(next))` when
/// they do.
pub fn apply(
  current: &WorkflowState,
  transition: &Transition,
  now: DateTime<Utc>,
) -> Result<Option<WorkflowState>, Guard> {
  let status = current.status;
  match transition {
    Transition::Edit => match status {
      Status::Draft => Ok(None),
      // Editing a rejected record sends it back to draft.
      Status::Rejected => Ok(Some(WorkflowState {
        status:         Status::Draft,
        submitted_at:   None,
        verified_at:    None,
        verified_by:    current.verified_by,
        rejection_note: None,
      })),
      _ => Err(Guard::NotEditable { status }),
    },
    Transition::Attach | Transition::Delete => {
      if status.is_editable() {
        Ok(None)
      } else {
        Err(Guard::NotEditable { status })
      }
    }
    Transition::Submit { attachments } => {
      if !status.is_editable() {
        return Err(Guard::NotSubmittable { status });
      }
      if *attachments == 0 {
        return Err(Guard::NoAttachments);
      }
      Ok(Some(WorkflowState {
        status:         Status::Submitted,
        submitted_at:   Some(now),
        verified_at:    None,
        verified_by:    current.verified_by,
        rejection_note: None,
      }))
    }
    Transition::Verify { validator } => {
      if status != Status::Submitted {
        return Err(Guard::NotAwaitingReview { status });
      }
      Ok(Some(WorkflowState {
        status:         Status::Verified,
        submitted_at:   current.submitted_at,
        verified_at:    Some(now),
        verified_by:    Some(*validator),
        rejection_note: None,
      }))
    }
    Transition::Reject { validator, note } => {
      if status != Status::Submitted {
        return Err(Guard::NotAwaitingReview { status });
      }
      Ok(Some(WorkflowState {
        status:         Status::Rejected,
        submitted_at:   current.submitted_at,
        verified_at:    None,
        verified_by:    Some(*validator),
        rejection_note: Some(note.as_str().to_owned()),
      }))
    }
  }
}
