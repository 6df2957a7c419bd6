//! Orchestrator tests against in-memory fakes of both stores.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  AchievementService, Error, ErrorKind,
  access::{Caller, Capability},
  achievement::{
    AchievementContent, AchievementDetails, AchievementInput, AchievementPatch, Attachment,
    CompetitionDetails, ContentId, ContentPatch, Level, NewContent,
  },
  error::Guard,
  reference::{AchievementReference, NewReference, Status, StatusChange, WorkflowState},
  service::ListOptions,
  store::{ContentStore, Directory, ReferenceQuery, ReferenceStore},
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("injected failure")]
struct Injected;

#[derive(Default)]
struct MemoryContents {
  docs:        Mutex<BTreeMap<ContentId, AchievementContent>>,
  fail_delete: AtomicBool,
  deletes:     AtomicUsize,
}

impl MemoryContents {
  fn len(&self) -> usize { self.docs.lock().unwrap().len() }

  fn remove(&self, id: &ContentId) { self.docs.lock().unwrap().remove(id); }
}

impl ContentStore for MemoryContents {
  type Error = Injected;

  async fn insert_content(&self, input: NewContent) -> Result<AchievementContent, Injected> {
    let now = Utc::now();
    let doc = AchievementContent {
      id:          ContentId::new(Uuid::new_v4().simple().to_string()),
      student_id:  input.student_id,
      title:       input.title,
      description: input.description,
      details:     input.details,
      attachments: Vec::new(),
      tags:        input.tags,
      points:      input.points,
      created_at:  now,
      updated_at:  now,
    };
    self.docs.lock().unwrap().insert(doc.id.clone(), doc.clone());
    Ok(doc)
  }

  async fn get_content<'a>(
    &'a self,
    id: &'a ContentId,
  ) -> Result<Option<AchievementContent>, Injected> {
    Ok(self.docs.lock().unwrap().get(id).cloned())
  }

  async fn update_content<'a>(
    &'a self,
    id: &'a ContentId,
    patch: ContentPatch,
  ) -> Result<Option<AchievementContent>, Injected> {
    let mut docs = self.docs.lock().unwrap();
    let Some(doc) = docs.get_mut(id) else { return Ok(None) };
    patch.apply(doc);
    doc.updated_at = Utc::now();
    Ok(Some(doc.clone()))
  }

  async fn append_attachment<'a>(
    &'a self,
    id: &'a ContentId,
    attachment: Attachment,
  ) -> Result<Option<AchievementContent>, Injected> {
    let mut docs = self.docs.lock().unwrap();
    let Some(doc) = docs.get_mut(id) else { return Ok(None) };
    doc.attachments.push(attachment);
    Ok(Some(doc.clone()))
  }

  async fn delete_content<'a>(&'a self, id: &'a ContentId) -> Result<(), Injected> {
    self.deletes.fetch_add(1, Ordering::SeqCst);
    if self.fail_delete.load(Ordering::SeqCst) {
      return Err(Injected);
    }
    self.docs.lock().unwrap().remove(id);
    Ok(())
  }

  async fn list_content_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<ContentId>, Injected> {
    Ok(
      self
        .docs
        .lock()
        .unwrap()
        .values()
        .filter(|d| d.created_at < cutoff)
        .map(|d| d.id.clone())
        .collect(),
    )
  }
}

type Rows = Mutex<BTreeMap<Uuid, (AchievementReference, bool)>>;

/// Reference fake. With `commit_delay` set, inserts run on a spawned task
/// that commits after the delay even if the caller stops waiting, and
/// `get_reference` queues behind it, like a single database thread.
#[derive(Default)]
struct MemoryReferences {
  rows:         Arc<Rows>,
  history:      Arc<Mutex<Vec<StatusChange>>>,
  fail_insert:  AtomicBool,
  stall_insert: AtomicBool,
  commit_delay: Mutex<Option<Duration>>,
  queue:        Arc<tokio::sync::Mutex<()>>,
}

fn commit_reference(
  rows: &Rows,
  history: &Mutex<Vec<StatusChange>>,
  input: NewReference,
) -> AchievementReference {
  let now = Utc::now();
  let reference = AchievementReference {
    id:         input.id,
    student_id: input.student_id,
    content_id: input.content_id,
    workflow:   WorkflowState::draft(),
    created_at: now,
    updated_at: now,
  };
  history.lock().unwrap().push(StatusChange {
    reference_id: reference.id,
    from:         None,
    to:           Status::Draft,
    actor:        input.actor,
    note:         None,
    at:           now,
  });
  rows.lock().unwrap().insert(reference.id, (reference.clone(), false));
  reference
}

impl MemoryReferences {
  fn live_count(&self) -> usize {
    self.rows.lock().unwrap().values().filter(|(_, deleted)| !deleted).count()
  }

  fn is_tombstoned(&self, id: Uuid) -> bool {
    self.rows.lock().unwrap().get(&id).is_some_and(|(_, d)| *d)
  }

  fn live(&self, id: Uuid) -> Option<AchievementReference> {
    self
      .rows
      .lock()
      .unwrap()
      .get(&id)
      .filter(|(_, deleted)| !deleted)
      .map(|(r, _)| r.clone())
  }
}

impl ReferenceStore for MemoryReferences {
  type Error = Injected;

  async fn insert_reference(&self, input: NewReference) -> Result<AchievementReference, Injected> {
    if self.stall_insert.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    if self.fail_insert.load(Ordering::SeqCst) {
      return Err(Injected);
    }
    let delay = *self.commit_delay.lock().unwrap();
    let Some(delay) = delay else {
      return Ok(commit_reference(&self.rows, &self.history, input));
    };
    let turn = self.queue.clone().lock_owned().await;
    let rows = self.rows.clone();
    let history = self.history.clone();
    let commit = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let reference = commit_reference(&rows, &history, input);
      drop(turn);
      reference
    });
    commit.await.map_err(|_| Injected)
  }

  async fn get_reference(&self, id: Uuid) -> Result<Option<AchievementReference>, Injected> {
    let _turn = self.queue.lock().await;
    Ok(self.live(id))
  }

  async fn list_references<'a>(
    &'a self,
    query: &'a ReferenceQuery,
  ) -> Result<Vec<AchievementReference>, Injected> {
    let mut rows: Vec<AchievementReference> = self
      .rows
      .lock()
      .unwrap()
      .values()
      .filter(|(r, deleted)| {
        !deleted
          && query.scope.permits(r.student_id)
          && query.status.is_none_or(|s| s == r.status())
      })
      .map(|(r, _)| r.clone())
      .collect();
    rows.sort_by_key(|r| r.created_at);
    Ok(rows)
  }

  async fn update_workflow(
    &self,
    id: Uuid,
    next: WorkflowState,
    actor: Uuid,
  ) -> Result<Option<AchievementReference>, Injected> {
    let mut rows = self.rows.lock().unwrap();
    let Some((r, false)) = rows.get_mut(&id) else { return Ok(None) };
    let from = r.status();
    r.workflow = next;
    r.updated_at = Utc::now();
    self.history.lock().unwrap().push(StatusChange {
      reference_id: id,
      from:         Some(from),
      to:           r.status(),
      actor,
      note:         r.workflow.rejection_note.clone(),
      at:           r.updated_at,
    });
    Ok(Some(r.clone()))
  }

  async fn touch(&self, id: Uuid) -> Result<Option<AchievementReference>, Injected> {
    let mut rows = self.rows.lock().unwrap();
    let Some((r, false)) = rows.get_mut(&id) else { return Ok(None) };
    r.updated_at = Utc::now();
    Ok(Some(r.clone()))
  }

  async fn soft_delete(&self, id: Uuid) -> Result<bool, Injected> {
    let mut rows = self.rows.lock().unwrap();
    match rows.get_mut(&id) {
      Some((_, deleted)) if !*deleted => {
        *deleted = true;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>, Injected> {
    Ok(
      self
        .history
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.reference_id == id)
        .cloned()
        .collect(),
    )
  }

  async fn live_content_ids(&self) -> Result<Vec<(Uuid, ContentId)>, Injected> {
    Ok(
      self
        .rows
        .lock()
        .unwrap()
        .values()
        .filter(|(_, deleted)| !deleted)
        .map(|(r, _)| (r.id, r.content_id.clone()))
        .collect(),
    )
  }
}

#[derive(Default)]
struct MemoryDirectory {
  students: Mutex<BTreeMap<Uuid, Uuid>>,
  advisees: Mutex<BTreeMap<Uuid, BTreeSet<Uuid>>>,
  lookups:  AtomicUsize,
}

impl Directory for MemoryDirectory {
  type Error = Injected;

  async fn student_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, Injected> {
    self.lookups.fetch_add(1, Ordering::SeqCst);
    Ok(self.students.lock().unwrap().get(&user_id).copied())
  }

  async fn advisees_of(&self, user_id: Uuid) -> Result<BTreeSet<Uuid>, Injected> {
    self.lookups.fetch_add(1, Ordering::SeqCst);
    Ok(self.advisees.lock().unwrap().get(&user_id).cloned().unwrap_or_default())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

type Service = AchievementService<MemoryReferences, MemoryContents, MemoryDirectory>;

struct Harness {
  service:    Service,
  references: Arc<MemoryReferences>,
  contents:   Arc<MemoryContents>,
  directory:  Arc<MemoryDirectory>,
}

impl Harness {
  fn new() -> Self {
    let references = Arc::new(MemoryReferences::default());
    let contents = Arc::new(MemoryContents::default());
    let directory = Arc::new(MemoryDirectory::default());
    let service = AchievementService::new(references.clone(), contents.clone(), directory.clone())
      .with_store_timeout(Duration::from_millis(500));
    Self { service, references, contents, directory }
  }

  /// A student caller with every owner capability.
  fn student(&self) -> Caller {
    let user_id = Uuid::new_v4();
    self.directory.students.lock().unwrap().insert(user_id, Uuid::new_v4());
    Caller::new(user_id, [
      Capability::Create,
      Capability::ReadOwn,
      Capability::Update,
      Capability::Delete,
      Capability::Submit,
      Capability::UploadAttachment,
      Capability::ReadHistory,
    ])
  }

  fn student_id(&self, caller: &Caller) -> Uuid {
    self.directory.students.lock().unwrap()[&caller.user_id]
  }

  /// A lecturer advising `advisees`.
  fn advisor(&self, advisees: &[&Caller]) -> Caller {
    let user_id = Uuid::new_v4();
    let ids = advisees.iter().map(|c| self.student_id(c)).collect();
    self.directory.advisees.lock().unwrap().insert(user_id, ids);
    Caller::new(user_id, [
      Capability::ReadAdvisee,
      Capability::Verify,
      Capability::Reject,
      Capability::ReadHistory,
    ])
  }

  fn admin(&self) -> Caller {
    Caller::new(Uuid::new_v4(), [
      Capability::ReadList,
      Capability::Verify,
      Capability::Reject,
      Capability::ReadHistory,
    ])
  }

  async fn create(&self, caller: &Caller) -> crate::view::AchievementView {
    self.service.create_achievement(caller, input("Nasional")).await.unwrap()
  }

  async fn create_submitted(&self, caller: &Caller) -> Uuid {
    let view = self.create(caller).await;
    self.service.append_attachment(view.id, caller, attachment()).await.unwrap();
    self.service.submit_achievement(view.id, caller).await.unwrap();
    view.id
  }
}

fn input(level: &str) -> AchievementInput {
  AchievementInput {
    title:       "Juara 1 Gemastik".into(),
    description: "Kategori pengembangan perangkat lunak".into(),
    details:     AchievementDetails::Competition(CompetitionDetails {
      competition_name: Some("Gemastik".into()),
      level: Some(Level::from(level)),
      rank: Some(1),
      ..Default::default()
    }),
    tags:        BTreeSet::from(["software".to_owned()]),
    points:      None,
  }
}

fn attachment() -> Attachment {
  Attachment {
    file_name:   "certificate.pdf".into(),
    file_url:    "/uploads/certificate.pdf".into(),
    file_type:   "application/pdf".into(),
    uploaded_at: Utc::now(),
  }
}

fn title_patch(title: &str) -> AchievementPatch {
  AchievementPatch { title: Some(title.into()), ..Default::default() }
}

// ─── Scenario ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_approval_scenario() {
  let h = Harness::new();
  let s = h.student();
  let v = h.admin();

  let created = h.create(&s).await;
  assert_eq!(created.points, 50);
  assert_eq!(created.workflow.status, Status::Draft);

  h.service.append_attachment(created.id, &s, attachment()).await.unwrap();
  let view = h.service.get_achievement(created.id, &s).await.unwrap();
  assert_eq!(view.attachments.len(), 1);

  let submitted = h.service.submit_achievement(created.id, &s).await.unwrap();
  assert_eq!(submitted.workflow.status, Status::Submitted);
  assert!(submitted.workflow.submitted_at.is_some());

  let verified = h.service.verify_achievement(created.id, &v).await.unwrap();
  assert_eq!(verified.workflow.status, Status::Verified);
  assert_eq!(verified.workflow.verified_by, Some(v.user_id));
  assert!(verified.workflow.verified_at.is_some());

  let err = h
    .service
    .update_achievement(created.id, &s, title_patch("Juara 2"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Conflict(Guard::NotEditable { status: Status::Verified })
  ));
}

// ─── Creation protocol ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_requires_student_profile() {
  let h = Harness::new();
  let stranger = Caller::new(Uuid::new_v4(), [Capability::Create]);
  let err = h.service.create_achievement(&stranger, input("Nasional")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  assert_eq!(h.contents.len(), 0);
}

#[tokio::test]
async fn failed_reference_insert_removes_content() {
  let h = Harness::new();
  let s = h.student();
  h.references.fail_insert.store(true, Ordering::SeqCst);

  let err = h.service.create_achievement(&s, input("Nasional")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);
  assert_eq!(h.contents.len(), 0);
  assert_eq!(h.references.live_count(), 0);
}

#[tokio::test]
async fn failed_compensation_leaves_detectable_orphan() {
  let h = Harness::new();
  let s = h.student();
  h.references.fail_insert.store(true, Ordering::SeqCst);
  h.contents.fail_delete.store(true, Ordering::SeqCst);

  let err = h.service.create_achievement(&s, input("Nasional")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);
  assert_eq!(h.contents.len(), 1);

  let report = h.service.scan_integrity(Duration::ZERO).await.unwrap();
  assert_eq!(report.orphaned_content.len(), 1);
  assert!(report.dangling_references.is_empty());

  h.contents.fail_delete.store(false, Ordering::SeqCst);
  assert_eq!(h.service.repair_orphans(&report).await.unwrap(), 1);
  assert_eq!(h.contents.len(), 0);
}

#[tokio::test]
async fn cancelled_creation_still_compensates() {
  let h = Harness::new();
  let s = h.student();
  h.references.stall_insert.store(true, Ordering::SeqCst);

  let attempt = tokio::time::timeout(
    Duration::from_millis(50),
    h.service.create_achievement(&s, input("Nasional")),
  )
  .await;
  assert!(attempt.is_err(), "creation should have been cancelled");

  for _ in 0..50 {
    if h.contents.len() == 0 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert_eq!(h.contents.len(), 0);
  assert!(h.contents.deletes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn timed_out_insert_that_commits_keeps_content() {
  let h = Harness::new();
  let s = h.student();
  *h.references.commit_delay.lock().unwrap() = Some(Duration::from_millis(800));

  let view = h.service.create_achievement(&s, input("Nasional")).await.unwrap();
  assert_eq!(h.references.live(view.id).unwrap().content_id, view.content_id);
  assert_eq!(h.contents.len(), 1);
  assert_eq!(h.contents.deletes.load(Ordering::SeqCst), 0);

  let report = h.service.scan_integrity(Duration::ZERO).await.unwrap();
  assert!(report.is_clean());
  let listed = h.service.list_achievements(&s, ListOptions::default()).await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn unconfirmed_insert_never_strands_a_reference() {
  let h = Harness::new();
  let s = h.student();
  // Outlasts both the insert and the follow-up lookup.
  *h.references.commit_delay.lock().unwrap() = Some(Duration::from_millis(1_200));

  let err = h.service.create_achievement(&s, input("Nasional")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);
  assert_eq!(h.contents.deletes.load(Ordering::SeqCst), 0);

  tokio::time::sleep(Duration::from_millis(400)).await;
  assert_eq!(h.references.live_count(), 1);
  let report = h.service.scan_integrity(Duration::ZERO).await.unwrap();
  assert!(report.dangling_references.is_empty());
  assert!(report.orphaned_content.is_empty());
  let listed = h.service.list_achievements(&s, ListOptions::default()).await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn timed_out_insert_that_never_lands_removes_content() {
  let h = Harness::new();
  let s = h.student();
  h.references.stall_insert.store(true, Ordering::SeqCst);

  let err = h.service.create_achievement(&s, input("Nasional")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);
  assert_eq!(h.contents.len(), 0);
  assert_eq!(h.references.live_count(), 0);
}

#[tokio::test]
async fn invalid_payload_is_validation_and_writes_nothing() {
  let h = Harness::new();
  let s = h.student();
  let mut bad = input("Nasional");
  bad.title = "  ".into();
  let err = h.service.create_achievement(&s, bad).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert_eq!(h.contents.len(), 0);
}

#[tokio::test]
async fn attachable_check_mirrors_append_rules() {
  let h = Harness::new();
  let s = h.student();
  let other = h.student();
  let v = h.admin();
  let id = h.create_submitted(&s).await;

  let err = h.service.check_attachable(id, &s).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(Guard::NotEditable { status: Status::Submitted })));
  let err = h.service.check_attachable(id, &other).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  h.service.reject_achievement(id, &v, Some("blurry".into())).await.unwrap();
  h.service.check_attachable(id, &s).await.unwrap();
  assert_eq!(h.references.live(id).unwrap().status(), Status::Rejected);
}

// ─── State machine through the orchestrator ──────────────────────────────────

#[tokio::test]
async fn submit_without_attachment_is_conflict_and_keeps_status() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;

  let err = h.service.submit_achievement(view.id, &s).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(Guard::NoAttachments)));
  assert_eq!(h.references.live(view.id).unwrap().status(), Status::Draft);
}

#[tokio::test]
async fn resubmitting_submitted_is_conflict() {
  let h = Harness::new();
  let s = h.student();
  let id = h.create_submitted(&s).await;
  let err = h.service.submit_achievement(id, &s).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Conflict(Guard::NotSubmittable { status: Status::Submitted })
  ));
}

#[tokio::test]
async fn reject_without_note_fails_before_any_store_access() {
  let h = Harness::new();
  let s = h.student();
  let v = h.admin();
  let id = h.create_submitted(&s).await;
  let lookups = h.directory.lookups.load(Ordering::SeqCst);

  for note in [None, Some(String::new()), Some("   ".into())] {
    let err = h.service.reject_achievement(id, &v, note).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
  }
  assert_eq!(h.directory.lookups.load(Ordering::SeqCst), lookups);
  assert_eq!(h.references.live(id).unwrap().status(), Status::Submitted);
}

#[tokio::test]
async fn editing_rejected_returns_to_draft() {
  let h = Harness::new();
  let s = h.student();
  let v = h.admin();
  let id = h.create_submitted(&s).await;

  let rejected = h
    .service
    .reject_achievement(id, &v, Some("scan is unreadable".into()))
    .await
    .unwrap();
  assert_eq!(rejected.workflow.status, Status::Rejected);
  assert_eq!(rejected.workflow.rejection_note.as_deref(), Some("scan is unreadable"));
  assert_eq!(rejected.workflow.verified_by, Some(v.user_id));

  let edited = h.service.update_achievement(id, &s, title_patch("Juara 1 (revisi)")).await.unwrap();
  assert_eq!(edited.workflow.status, Status::Draft);
  assert_eq!(edited.workflow.rejection_note, None);
  assert_eq!(edited.title, "Juara 1 (revisi)");
}

#[tokio::test]
async fn editing_draft_keeps_status_and_untouched_fields() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;

  let edited = h.service.update_achievement(view.id, &s, title_patch("Renamed")).await.unwrap();
  assert_eq!(edited.workflow.status, Status::Draft);
  assert_eq!(edited.title, "Renamed");
  assert_eq!(edited.description, view.description);
  assert_eq!(edited.points, view.points);
  assert_eq!(edited.tags, view.tags);
}

#[tokio::test]
async fn owners_cannot_review_their_own_work() {
  let h = Harness::new();
  let s = h.student();
  let id = h.create_submitted(&s).await;
  let mut both = s.clone();
  both.capabilities = [Capability::Verify, Capability::Reject].into_iter().collect();

  let err = h.service.verify_achievement(id, &both).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}

// ─── Ownership ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn non_owner_is_forbidden_in_every_status() {
  let h = Harness::new();
  let owner = h.student();
  let other = h.student();
  let admin = h.admin();

  let draft = h.create(&owner).await.id;
  let submitted = h.create_submitted(&owner).await;
  let verified = h.create_submitted(&owner).await;
  h.service.verify_achievement(verified, &admin).await.unwrap();
  let rejected = h.create_submitted(&owner).await;
  h.service.reject_achievement(rejected, &admin, Some("no".into())).await.unwrap();

  for id in [draft, submitted, verified, rejected] {
    let e1 = h.service.update_achievement(id, &other, title_patch("x")).await.unwrap_err();
    let e2 = h.service.delete_achievement(id, &other).await.unwrap_err();
    let e3 = h.service.submit_achievement(id, &other).await.unwrap_err();
    let e4 = h.service.append_attachment(id, &other, attachment()).await.unwrap_err();
    for e in [e1, e2, e3, e4] {
      assert_eq!(e.kind(), ErrorKind::Forbidden, "{e}");
    }
  }
}

#[tokio::test]
async fn missing_capability_is_forbidden_before_store_access() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;
  let lookups = h.directory.lookups.load(Ordering::SeqCst);
  let nobody = Caller::new(s.user_id, Vec::new());

  assert_eq!(
    h.service.list_achievements(&nobody, ListOptions::default()).await.unwrap_err().kind(),
    ErrorKind::Forbidden
  );
  assert_eq!(
    h.service.submit_achievement(view.id, &nobody).await.unwrap_err().kind(),
    ErrorKind::Forbidden
  );
  assert_eq!(h.directory.lookups.load(Ordering::SeqCst), lookups);
}

// ─── Reads & visibility ──────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_reads_are_identical() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;
  h.service.append_attachment(view.id, &s, attachment()).await.unwrap();

  let a = serde_json::to_vec(&h.service.get_achievement(view.id, &s).await.unwrap()).unwrap();
  let b = serde_json::to_vec(&h.service.get_achievement(view.id, &s).await.unwrap()).unwrap();
  assert_eq!(a, b);
}

#[tokio::test]
async fn missing_content_is_an_integrity_fault() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;
  h.contents.remove(&view.content_id);

  let err = h.service.get_achievement(view.id, &s).await.unwrap_err();
  assert!(matches!(err, Error::Integrity { reference_id, .. } if reference_id == view.id));
  assert_eq!(err.kind(), ErrorKind::Integrity);

  let report = h.service.scan_integrity(Duration::ZERO).await.unwrap();
  assert_eq!(report.dangling_references.len(), 1);
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
  let h = Harness::new();
  let s = h.student();
  let err = h.service.get_achievement(Uuid::new_v4(), &s).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn advisor_with_no_advisees_sees_nothing() {
  let h = Harness::new();
  let s = h.student();
  h.create(&s).await;
  let lonely = h.advisor(&[]);

  let listed = h.service.list_achievements(&lonely, ListOptions::default()).await.unwrap();
  assert!(listed.is_empty());
}

#[tokio::test]
async fn scopes_restrict_listing_and_reads() {
  let h = Harness::new();
  let a = h.student();
  let b = h.student();
  let a1 = h.create(&a).await;
  let b1 = h.create(&b).await;
  let advisor = h.advisor(&[&a]);
  let admin = h.admin();

  let own = h.service.list_achievements(&a, ListOptions::default()).await.unwrap();
  assert_eq!(own.iter().map(|v| v.id).collect::<Vec<_>>(), vec![a1.id]);

  let advised = h.service.list_achievements(&advisor, ListOptions::default()).await.unwrap();
  assert_eq!(advised.iter().map(|v| v.id).collect::<Vec<_>>(), vec![a1.id]);

  let all = h.service.list_achievements(&admin, ListOptions::default()).await.unwrap();
  assert_eq!(all.len(), 2);

  assert_eq!(
    h.service.get_achievement(b1.id, &advisor).await.unwrap_err().kind(),
    ErrorKind::Forbidden
  );
  assert_eq!(
    h.service.get_achievement(b1.id, &a).await.unwrap_err().kind(),
    ErrorKind::Forbidden
  );
  h.service.get_achievement(b1.id, &admin).await.unwrap();
}

#[tokio::test]
async fn list_filters_by_status() {
  let h = Harness::new();
  let s = h.student();
  h.create(&s).await;
  let submitted = h.create_submitted(&s).await;
  let admin = h.admin();

  let options = ListOptions { status: Some(Status::Submitted), ..Default::default() };
  let queue = h.service.list_achievements(&admin, options).await.unwrap();
  assert_eq!(queue.iter().map(|v| v.id).collect::<Vec<_>>(), vec![submitted]);
}

// ─── Deletion & history ──────────────────────────────────────────────────────

#[tokio::test]
async fn delete_purges_content_and_tombstones_reference() {
  let h = Harness::new();
  let s = h.student();
  let view = h.create(&s).await;

  h.service.delete_achievement(view.id, &s).await.unwrap();
  assert_eq!(h.contents.len(), 0);
  assert!(h.references.is_tombstoned(view.id));
  assert_eq!(
    h.service.get_achievement(view.id, &s).await.unwrap_err().kind(),
    ErrorKind::NotFound
  );
  assert!(h.service.scan_integrity(Duration::ZERO).await.unwrap().is_clean());
}

#[tokio::test]
async fn delete_is_blocked_once_submitted() {
  let h = Harness::new();
  let s = h.student();
  let id = h.create_submitted(&s).await;
  let err = h.service.delete_achievement(id, &s).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert_eq!(h.contents.len(), 1);
}

#[tokio::test]
async fn history_follows_transitions() {
  let h = Harness::new();
  let s = h.student();
  let admin = h.admin();
  let id = h.create_submitted(&s).await;
  h.service.reject_achievement(id, &admin, Some("wrong file".into())).await.unwrap();
  h.service.update_achievement(id, &s, title_patch("fixed")).await.unwrap();

  let history = h.service.achievement_history(id, &s).await.unwrap();
  let steps: Vec<(Option<Status>, Status)> = history.iter().map(|c| (c.from, c.to)).collect();
  assert_eq!(steps, vec![
    (None, Status::Draft),
    (Some(Status::Draft), Status::Submitted),
    (Some(Status::Submitted), Status::Rejected),
    (Some(Status::Rejected), Status::Draft),
  ]);
  assert_eq!(history[2].note.as_deref(), Some("wrong file"));
  assert_eq!(history[2].actor, admin.user_id);
}
