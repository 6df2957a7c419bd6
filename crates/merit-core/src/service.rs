//! The achievement orchestrator.
//!
//! Composes a [`ReferenceStore`], a [`ContentStore`] and a [`Directory`] into
//! one logical achievement entity. Writes always go content first, then
//! reference. Reads always go reference first, then content. A live
//! reference whose content is missing is an integrity fault, never a
//! not-found.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{Caller, Capability},
  achievement::{
    AchievementContent, AchievementInput, AchievementPatch, Attachment, ContentId,
  },
  reference::{AchievementReference, NewReference, Status, StatusChange},
  store::{ContentStore, Directory, ReferenceQuery, ReferenceStore},
  view::AchievementView,
  visibility::{Scope, ScopeKind, scope_kind},
  workflow::{self, RejectionNote, Transition},
};

pub(crate) const REFERENCE_STORE: &str = "reference";
pub(crate) const CONTENT_STORE: &str = "content";
pub(crate) const DIRECTORY: &str = "directory";

/// Upper bound on a single store call unless configured otherwise.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Optional filters for [`AchievementService::list_achievements`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
  pub status: Option<Status>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// Run a store call under `limit`, mapping both store errors and timeouts to
/// [`Error::Dependency`].
pub(crate) async fn bounded<T, E, F>(limit: Duration, store: &'static str, call: F) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match tokio::time::timeout(limit, call).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(Error::dependency(store, e)),
    Err(elapsed) => Err(Error::dependency(store, elapsed)),
  }
}

pub struct AchievementService<R, C, D> {
  pub(crate) references: Arc<R>,
  pub(crate) contents:   Arc<C>,
  pub(crate) directory:  Arc<D>,
  pub(crate) timeout:    Duration,
}

impl<R, C, D> AchievementService<R, C, D>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory,
{
  pub fn new(references: Arc<R>, contents: Arc<C>, directory: Arc<D>) -> Self {
    Self { references, contents, directory, timeout: DEFAULT_STORE_TIMEOUT }
  }

  pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  // ── Create ──────────────────────────────────────────────────────────────

  /// Create a `draft` achievement owned by the caller's student profile.
  ///
  /// If the reference insert fails after the content insert succeeded, the
  /// content is deleted again before the original error is returned. A
  /// timed-out insert may still commit, so the reference is looked up first
  /// and the content is only deleted once the reference is known to be
  /// absent.
  pub async fn create_achievement(
    &self,
    caller: &Caller,
    input: AchievementInput,
  ) -> Result<AchievementView> {
    caller.require(Capability::Create)?;
    let student_id = self.require_student(caller).await?;
    let new_content = input.into_content(student_id)?;

    let content = bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.insert_content(new_content),
    )
    .await?;

    let reference_id = Uuid::new_v4();
    let pending = PendingContent {
      references: self.references.clone(),
      contents:   self.contents.clone(),
      reference:  reference_id,
      content:    Some(content.id.clone()),
      timeout:    self.timeout,
    };
    let inserted = tokio::time::timeout(
      self.timeout,
      self.references.insert_reference(NewReference {
        id: reference_id,
        student_id,
        content_id: content.id.clone(),
        actor: caller.user_id,
      }),
    )
    .await;

    let reference = match inserted {
      Ok(Ok(reference)) => {
        pending.disarm();
        reference
      }
      Ok(Err(e)) => {
        let err = Error::dependency(REFERENCE_STORE, e);
        warn!(content_id = %content.id, error = %err, "reference insert failed, compensating");
        pending.compensate().await;
        return Err(err);
      }
      Err(elapsed) => {
        warn!(
          %reference_id,
          content_id = %content.id,
          "reference insert timed out, checking whether it landed"
        );
        match pending.settle().await {
          Some(reference) => reference,
          None => return Err(Error::dependency(REFERENCE_STORE, elapsed)),
        }
      }
    };

    info!(
      reference_id = %reference.id,
      content_id = %content.id,
      %student_id,
      "achievement created"
    );
    Ok(AchievementView::merge(&reference, &content))
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn get_achievement(&self, id: Uuid, caller: &Caller) -> Result<AchievementView> {
    let kind = scope_kind(caller)?;
    let scope = self.resolve_scope(caller, kind).await?;
    let reference = self.load_reference(id).await?;
    if !scope.permits(reference.student_id) {
      return Err(Error::Forbidden("achievement is outside the caller's scope".into()));
    }
    let content = self.load_content(&reference).await?;
    Ok(AchievementView::merge(&reference, &content))
  }

  /// List every achievement visible to the caller.
  ///
  /// References and contents are read one after the other; the listing is
  /// not a consistent snapshot across the two stores.
  pub async fn list_achievements(
    &self,
    caller: &Caller,
    options: ListOptions,
  ) -> Result<Vec<AchievementView>> {
    let kind = scope_kind(caller)?;
    let scope = self.resolve_scope(caller, kind).await?;
    if scope.is_empty() {
      debug!(user_id = %caller.user_id, ?kind, "empty scope, nothing to list");
      return Ok(Vec::new());
    }

    let query = ReferenceQuery {
      scope,
      status: options.status,
      limit: options.limit,
      offset: options.offset,
    };
    let references = bounded(
      self.timeout,
      REFERENCE_STORE,
      self.references.list_references(&query),
    )
    .await?;

    let mut views = Vec::with_capacity(references.len());
    for reference in &references {
      let content = self.load_content(reference).await?;
      views.push(AchievementView::merge(reference, &content));
    }
    Ok(views)
  }

  /// Status history of an achievement the caller can see.
  pub async fn achievement_history(
    &self,
    id: Uuid,
    caller: &Caller,
  ) -> Result<Vec<StatusChange>> {
    caller.require(Capability::ReadHistory)?;
    let kind = scope_kind(caller)?;
    let scope = self.resolve_scope(caller, kind).await?;
    let reference = self.load_reference(id).await?;
    if !scope.permits(reference.student_id) {
      return Err(Error::Forbidden("achievement is outside the caller's scope".into()));
    }
    bounded(self.timeout, REFERENCE_STORE, self.references.history(id)).await
  }

  // ── Owner transitions ───────────────────────────────────────────────────

  /// Apply a partial edit. Editing a `rejected` achievement returns it to
  /// `draft` and clears the rejection note.
  pub async fn update_achievement(
    &self,
    id: Uuid,
    caller: &Caller,
    patch: AchievementPatch,
  ) -> Result<AchievementView> {
    caller.require(Capability::Update)?;
    let patch = patch.into_content_patch()?;
    let reference = self.owned_reference(id, caller).await?;
    let next = workflow::apply(&reference.workflow, &Transition::Edit, Utc::now())
      .map_err(Error::Conflict)?;

    let content = bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.update_content(&reference.content_id, patch),
    )
    .await?
    .ok_or_else(|| integrity_fault(&reference))?;

    let reference = match next {
      Some(state) => {
        info!(reference_id = %id, from = %reference.status(), to = %state.status, "achievement edited");
        bounded(
          self.timeout,
          REFERENCE_STORE,
          self.references.update_workflow(id, state, caller.user_id),
        )
        .await?
      }
      None => bounded(self.timeout, REFERENCE_STORE, self.references.touch(id)).await?,
    }
    .ok_or(Error::ReferenceNotFound(id))?;

    Ok(AchievementView::merge(&reference, &content))
  }

  /// Check that the caller could append an attachment right now, without
  /// writing anything. Lets transports refuse before storing file bytes.
  pub async fn check_attachable(&self, id: Uuid, caller: &Caller) -> Result<()> {
    caller.require(Capability::UploadAttachment)?;
    self.attachable_reference(id, caller).await.map(|_| ())
  }

  /// Append an attachment. The status is left unchanged.
  pub async fn append_attachment(
    &self,
    id: Uuid,
    caller: &Caller,
    attachment: Attachment,
  ) -> Result<Attachment> {
    caller.require(Capability::UploadAttachment)?;
    attachment.validate()?;
    let reference = self.attachable_reference(id, caller).await?;

    bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.append_attachment(&reference.content_id, attachment.clone()),
    )
    .await?
    .ok_or_else(|| integrity_fault(&reference))?;

    bounded(self.timeout, REFERENCE_STORE, self.references.touch(id))
      .await?
      .ok_or(Error::ReferenceNotFound(id))?;

    debug!(reference_id = %id, file = %attachment.file_name, "attachment appended");
    Ok(attachment)
  }

  /// Submit for review. Requires at least one attachment.
  pub async fn submit_achievement(&self, id: Uuid, caller: &Caller) -> Result<AchievementView> {
    caller.require(Capability::Submit)?;
    let reference = self.owned_reference(id, caller).await?;
    let content = self.load_content(&reference).await?;
    let transition = Transition::Submit { attachments: content.attachments.len() };
    self.advance(&reference, &content, &transition, caller).await
  }

  /// Tombstone the reference and purge its content.
  ///
  /// Content goes first. If the tombstone write then fails, the reference is
  /// still live and a retried delete completes the job, because deleting
  /// absent content succeeds.
  pub async fn delete_achievement(&self, id: Uuid, caller: &Caller) -> Result<()> {
    caller.require(Capability::Delete)?;
    let reference = self.owned_reference(id, caller).await?;
    workflow::apply(&reference.workflow, &Transition::Delete, Utc::now())
      .map_err(Error::Conflict)?;

    bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.delete_content(&reference.content_id),
    )
    .await?;

    let deleted = bounded(self.timeout, REFERENCE_STORE, self.references.soft_delete(id)).await?;
    if !deleted {
      return Err(Error::ReferenceNotFound(id));
    }
    info!(reference_id = %id, content_id = %reference.content_id, "achievement deleted");
    Ok(())
  }

  // ── Validator transitions ───────────────────────────────────────────────

  pub async fn verify_achievement(&self, id: Uuid, caller: &Caller) -> Result<AchievementView> {
    caller.require(Capability::Verify)?;
    let reference = self.reviewable_reference(id, caller).await?;
    let content = self.load_content(&reference).await?;
    let transition = Transition::Verify { validator: caller.user_id };
    self.advance(&reference, &content, &transition, caller).await
  }

  /// Reject with a note. A blank or missing note fails before any store is
  /// touched.
  pub async fn reject_achievement(
    &self,
    id: Uuid,
    caller: &Caller,
    note: Option<String>,
  ) -> Result<AchievementView> {
    caller.require(Capability::Reject)?;
    let note = RejectionNote::parse(note)?;
    let reference = self.reviewable_reference(id, caller).await?;
    let content = self.load_content(&reference).await?;
    let transition = Transition::Reject { validator: caller.user_id, note };
    self.advance(&reference, &content, &transition, caller).await
  }

  // ── Helpers ─────────────────────────────────────────────────────────────

  /// Run a status-changing transition and persist the result.
  async fn advance(
    &self,
    reference: &AchievementReference,
    content: &AchievementContent,
    transition: &Transition,
    caller: &Caller,
  ) -> Result<AchievementView> {
    let next = workflow::apply(&reference.workflow, transition, Utc::now())
      .map_err(Error::Conflict)?;
    let Some(state) = next else {
      return Ok(AchievementView::merge(reference, content));
    };

    let from = reference.status();
    let to = state.status;
    let updated = bounded(
      self.timeout,
      REFERENCE_STORE,
      self.references.update_workflow(reference.id, state, caller.user_id),
    )
    .await?
    .ok_or(Error::ReferenceNotFound(reference.id))?;

    info!(reference_id = %reference.id, %from, %to, actor = %caller.user_id, "status changed");
    Ok(AchievementView::merge(&updated, content))
  }

  async fn student_for(&self, caller: &Caller) -> Result<Option<Uuid>> {
    bounded(self.timeout, DIRECTORY, self.directory.student_for_user(caller.user_id)).await
  }

  async fn require_student(&self, caller: &Caller) -> Result<Uuid> {
    self
      .student_for(caller)
      .await?
      .ok_or_else(|| Error::Forbidden("caller has no student profile".into()))
  }

  async fn resolve_scope(&self, caller: &Caller, kind: ScopeKind) -> Result<Scope> {
    match kind {
      ScopeKind::Global => Ok(Scope::Global),
      ScopeKind::Own => Ok(Scope::own(self.student_for(caller).await?)),
      ScopeKind::Advisee => {
        let ids =
          bounded(self.timeout, DIRECTORY, self.directory.advisees_of(caller.user_id)).await?;
        Ok(Scope::Students(ids))
      }
    }
  }

  async fn load_reference(&self, id: Uuid) -> Result<AchievementReference> {
    bounded(self.timeout, REFERENCE_STORE, self.references.get_reference(id))
      .await?
      .ok_or(Error::ReferenceNotFound(id))
  }

  async fn load_content(&self, reference: &AchievementReference) -> Result<AchievementContent> {
    bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.get_content(&reference.content_id),
    )
    .await?
    .ok_or_else(|| integrity_fault(reference))
  }

  /// Load a reference the caller owns.
  async fn owned_reference(&self, id: Uuid, caller: &Caller) -> Result<AchievementReference> {
    let student_id = self.require_student(caller).await?;
    let reference = self.load_reference(id).await?;
    if reference.student_id != student_id {
      return Err(Error::Forbidden("caller does not own this achievement".into()));
    }
    Ok(reference)
  }

  async fn attachable_reference(&self, id: Uuid, caller: &Caller) -> Result<AchievementReference> {
    let reference = self.owned_reference(id, caller).await?;
    workflow::apply(&reference.workflow, &Transition::Attach, Utc::now())
      .map_err(Error::Conflict)?;
    Ok(reference)
  }

  /// Load a reference the caller may review; owners may not review their
  /// own work.
  async fn reviewable_reference(&self, id: Uuid, caller: &Caller) -> Result<AchievementReference> {
    let student_id = self.student_for(caller).await?;
    let reference = self.load_reference(id).await?;
    if student_id == Some(reference.student_id) {
      return Err(Error::Forbidden("owners cannot review their own achievement".into()));
    }
    Ok(reference)
  }
}

fn integrity_fault(reference: &AchievementReference) -> Error {
  error!(
    target: "merit::integrity",
    reference_id = %reference.id,
    content_id = %reference.content_id,
    "live reference points at missing content"
  );
  Error::Integrity {
    reference_id: reference.id,
    content_id:   reference.content_id.clone(),
  }
}

// ─── Compensation guard ──────────────────────────────────────────────────────

/// Holds a freshly inserted content id until its reference is known to
/// exist or known to be absent.
///
/// Dropped while still armed (e.g. the request future was cancelled), it
/// spawns [`settle_pending`] on the current runtime.
struct PendingContent<R: ReferenceStore + 'static, C: ContentStore + 'static> {
  references: Arc<R>,
  contents:   Arc<C>,
  reference:  Uuid,
  content:    Option<ContentId>,
  timeout:    Duration,
}

impl<R, C> PendingContent<R, C>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
{
  fn disarm(mut self) { self.content = None; }

  /// The insert definitely failed: delete the content now. The guard stays
  /// armed until the delete has been attempted, so a cancellation mid-way
  /// still respawns the cleanup.
  async fn compensate(mut self) {
    if let Some(id) = self.content.clone() {
      purge_orphan(self.contents.as_ref(), &id, self.timeout).await;
      self.content = None;
    }
  }

  /// The insert outcome is unknown: look the reference up and only delete
  /// the content if it is absent. Returns the reference if it landed.
  async fn settle(mut self) -> Option<AchievementReference> {
    let id = self.content.clone()?;
    let landed = settle_pending(
      self.references.as_ref(),
      self.contents.as_ref(),
      self.reference,
      &id,
      self.timeout,
    )
    .await;
    self.content = None;
    landed
  }
}

impl<R, C> Drop for PendingContent<R, C>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
{
  fn drop(&mut self) {
    let Some(id) = self.content.take() else { return };
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let references = self.references.clone();
        let contents = self.contents.clone();
        let reference = self.reference;
        let timeout = self.timeout;
        warn!(content_id = %id, "creation cancelled during reference insert, settling");
        handle.spawn(async move {
          settle_pending(references.as_ref(), contents.as_ref(), reference, &id, timeout).await;
        });
      }
      Err(_) => warn!(
        target: "merit::orphan",
        content_id = %id,
        "no runtime for compensating delete; content orphaned"
      ),
    }
  }
}

/// Resolve a creation whose reference insert has an unknown outcome.
///
/// A reference that landed keeps its content. A reference that is absent
/// gets its content deleted. If the lookup itself fails the content is left
/// for the integrity scan.
async fn settle_pending<R: ReferenceStore, C: ContentStore>(
  references: &R,
  contents: &C,
  reference_id: Uuid,
  content_id: &ContentId,
  timeout: Duration,
) -> Option<AchievementReference> {
  match bounded(timeout, REFERENCE_STORE, references.get_reference(reference_id)).await {
    Ok(Some(reference)) => {
      info!(%reference_id, %content_id, "reference insert landed late, keeping content");
      Some(reference)
    }
    Ok(None) => {
      purge_orphan(contents, content_id, timeout).await;
      None
    }
    Err(e) => {
      warn!(
        target: "merit::orphan",
        %reference_id,
        %content_id,
        error = %e,
        "could not confirm reference insert; content left for the integrity scan"
      );
      None
    }
  }
}

async fn purge_orphan<C: ContentStore>(store: &C, id: &ContentId, timeout: Duration) {
  match bounded(timeout, CONTENT_STORE, store.delete_content(id)).await {
    Ok(()) => debug!(content_id = %id, "orphaned content removed"),
    Err(e) => warn!(
      target: "merit::orphan",
      content_id = %id,
      error = %e,
      "compensating delete failed; content orphaned"
    ),
  }
}
