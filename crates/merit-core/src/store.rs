//! Store and directory traits.
//!
//! The orchestrator is generic over a [`ReferenceStore`] (relational,
//! workflow), a [`ContentStore`] (documents, substance) and a [`Directory`]
//! (student/advisor lookup). The two stores share no transaction boundary.
//!
//! All methods return `Send` futures so implementations can be driven from a
//! multi-threaded runtime.

use std::{collections::BTreeSet, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  achievement::{AchievementContent, Attachment, ContentId, ContentPatch, NewContent},
  reference::{AchievementReference, NewReference, Status, StatusChange, WorkflowState},
  visibility::Scope,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Default page size for [`ReferenceStore::list_references`].
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Parameters for [`ReferenceStore::list_references`].
#[derive(Debug, Clone)]
pub struct ReferenceQuery {
  pub scope:  Scope,
  pub status: Option<Status>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

impl ReferenceQuery {
  pub fn new(scope: Scope) -> Self { Self { scope, status: None, limit: None, offset: None } }
}

// ─── Content store ───────────────────────────────────────────────────────────

/// Document store for achievement content.
///
/// Retrying any write with the same input has no effect beyond the write
/// itself. Deleting an absent document succeeds.
pub trait ContentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new document; the store assigns its id.
  fn insert_content(
    &self,
    input: NewContent,
  ) -> impl Future<Output = Result<AchievementContent, Self::Error>> + Send + '_;

  fn get_content<'a>(
    &'a self,
    id: &'a ContentId,
  ) -> impl Future<Output = Result<Option<AchievementContent>, Self::Error>> + Send + 'a;

  /// Merge the present fields of `patch` into the document. Returns `None`
  /// if the document does not exist.
  fn update_content<'a>(
    &'a self,
    id: &'a ContentId,
    patch: ContentPatch,
  ) -> impl Future<Output = Result<Option<AchievementContent>, Self::Error>> + Send + 'a;

  /// Append to the attachment list. Returns `None` if the document does not
  /// exist.
  fn append_attachment<'a>(
    &'a self,
    id: &'a ContentId,
    attachment: Attachment,
  ) -> impl Future<Output = Result<Option<AchievementContent>, Self::Error>> + Send + 'a;

  /// Remove the document. Absent documents are not an error.
  fn delete_content<'a>(
    &'a self,
    id: &'a ContentId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Ids of every document created strictly before `cutoff`.
  fn list_content_ids(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ContentId>, Self::Error>> + Send + '_;
}

// ─── Reference store ─────────────────────────────────────────────────────────

/// Relational store for achievement references.
///
/// All read methods ignore soft-deleted rows.
pub trait ReferenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a new `draft` reference and its initial history entry under
  /// `input.id`.
  ///
  /// A read issued after this call, even one issued after the caller gave
  /// up waiting, must observe the insert's final outcome.
  fn insert_reference(
    &self,
    input: NewReference,
  ) -> impl Future<Output = Result<AchievementReference, Self::Error>> + Send + '_;

  fn get_reference(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AchievementReference>, Self::Error>> + Send + '_;

  /// References matching `query`, oldest first.
  fn list_references<'a>(
    &'a self,
    query: &'a ReferenceQuery,
  ) -> impl Future<Output = Result<Vec<AchievementReference>, Self::Error>> + Send + 'a;

  /// Replace the workflow fields and append a history entry, atomically.
  /// Returns `None` if the reference does not exist.
  fn update_workflow(
    &self,
    id: Uuid,
    next: WorkflowState,
    actor: Uuid,
  ) -> impl Future<Output = Result<Option<AchievementReference>, Self::Error>> + Send + '_;

  /// Refresh `updated_at` after a content-only change.
  fn touch(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AchievementReference>, Self::Error>> + Send + '_;

  /// Mark the reference deleted. Returns `false` if it was already gone.
  fn soft_delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Status history of a live reference, oldest first.
  fn history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<StatusChange>, Self::Error>> + Send + '_;

  /// `(reference id, content id)` for every live reference.
  fn live_content_ids(
    &self,
  ) -> impl Future<Output = Result<Vec<(Uuid, ContentId)>, Self::Error>> + Send + '_;
}

// ─── Directory ───────────────────────────────────────────────────────────────

/// Student/advisor lookups owned by another subsystem.
pub trait Directory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The student profile belonging to a user, if any.
  fn student_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  /// Students advised by the lecturer profile of `user_id`.
  fn advisees_of(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<BTreeSet<Uuid>, Self::Error>> + Send + '_;
}
