//! Error taxonomy for `merit-core`.
//!
//! Every failure surfaced by the orchestrator belongs to exactly one
//! [`ErrorKind`]. Transport layers map kinds to their own codes.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{achievement::ContentId, reference::Status};

/// The state-machine guard that rejected a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
  /// Edits, uploads and deletion require `draft` or `rejected`.
  NotEditable { status: Status },
  /// Submission requires `draft` or `rejected`.
  NotSubmittable { status: Status },
  /// Submission requires at least one attachment.
  NoAttachments,
  /// Verification and rejection require `submitted`.
  NotAwaitingReview { status: Status },
}

impl std::fmt::Display for Guard {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NotEditable { status } => {
        write!(f, "achievement in status {status} cannot be modified")
      }
      Self::NotSubmittable { status } => {
        write!(f, "achievement in status {status} cannot be submitted")
      }
      Self::NoAttachments => {
        f.write_str("at least one attachment is required before submitting")
      }
      Self::NotAwaitingReview { status } => {
        write!(f, "achievement in status {status} is not awaiting review")
      }
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("achievement not found: {0}")]
  ReferenceNotFound(Uuid),

  #[error("conflict: {0}")]
  Conflict(Guard),

  /// A live reference points at content that does not exist.
  #[error("integrity fault: reference {reference_id} points at missing content {content_id}")]
  Integrity {
    reference_id: Uuid,
    content_id:   ContentId,
  },

  #[error("{store} store failure: {source}")]
  Dependency {
    store:  &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// Coarse classification of an [`Error`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  strum::Display,
  strum::AsRefStr,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  Forbidden,
  NotFound,
  Conflict,
  Integrity,
  Dependency,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::ReferenceNotFound(_) => ErrorKind::NotFound,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::Integrity { .. } => ErrorKind::Integrity,
      Self::Dependency { .. } => ErrorKind::Dependency,
    }
  }

  pub(crate) fn dependency<E>(store: &'static str, source: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Dependency { store, source: Box::new(source) }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
