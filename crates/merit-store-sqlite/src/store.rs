//! [`SqliteStore`]: the SQLite implementation of [`ReferenceStore`] and
//! [`Directory`].

use std::{collections::BTreeSet, path::Path};

use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use merit_core::{
  achievement::ContentId,
  reference::{AchievementReference, NewReference, Status, StatusChange, WorkflowState},
  store::{DEFAULT_LIST_LIMIT, Directory, ReferenceQuery, ReferenceStore},
  visibility::Scope,
};

use crate::{
  Result,
  encode::{
    REFERENCE_COLUMNS, RawReference, RawStatusChange, decode_uuid, encode_dt, encode_status,
    encode_uuid, now,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Reference store and student directory backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Directory maintenance ─────────────────────────────────────────────────

  /// Create a student profile for `user_id` and return its id.
  pub async fn register_student(&self, user_id: Uuid) -> Result<Uuid> {
    let student_id = Uuid::new_v4();
    let student_str = encode_uuid(student_id);
    let user_str = encode_uuid(user_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, user_id) VALUES (?1, ?2)",
          rusqlite::params![student_str, user_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(student_id)
  }

  /// Create a lecturer profile for `user_id` and return its id.
  pub async fn register_lecturer(&self, user_id: Uuid) -> Result<Uuid> {
    let lecturer_id = Uuid::new_v4();
    let lecturer_str = encode_uuid(lecturer_id);
    let user_str = encode_uuid(user_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO lecturers (lecturer_id, user_id) VALUES (?1, ?2)",
          rusqlite::params![lecturer_str, user_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(lecturer_id)
  }

  /// Make `lecturer_id` the advisor of `student_id`. Returns `false` if the
  /// student does not exist.
  pub async fn assign_advisor(&self, student_id: Uuid, lecturer_id: Uuid) -> Result<bool> {
    let student_str = encode_uuid(student_id);
    let lecturer_str = encode_uuid(lecturer_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE students SET advisor_id = ?2 WHERE student_id = ?1",
          rusqlite::params![student_str, lecturer_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }
}

/// Read one live reference row inside an open connection or transaction.
fn select_live(
  conn: &rusqlite::Connection,
  id_str: &str,
) -> rusqlite::Result<Option<RawReference>> {
  conn
    .query_row(
      &format!(
        "SELECT {REFERENCE_COLUMNS} FROM achievement_references
         WHERE reference_id = ?1 AND deleted_at IS NULL"
      ),
      rusqlite::params![id_str],
      RawReference::from_row,
    )
    .optional()
}

/// SQLite treats a negative `LIMIT` as unbounded; saturate instead of
/// wrapping.
fn clamp_i64(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

// ─── ReferenceStore impl ─────────────────────────────────────────────────────

impl ReferenceStore for SqliteStore {
  type Error = crate::Error;

  async fn insert_reference(&self, input: NewReference) -> Result<AchievementReference> {
    let now = now();
    let reference = AchievementReference {
      id:         input.id,
      student_id: input.student_id,
      content_id: input.content_id,
      workflow:   WorkflowState::draft(),
      created_at: now,
      updated_at: now,
    };

    let id_str      = encode_uuid(reference.id);
    let student_str = encode_uuid(reference.student_id);
    let content_str = reference.content_id.as_str().to_owned();
    let status_str  = encode_status(Status::Draft);
    let actor_str   = encode_uuid(input.actor);
    let at_str      = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO achievement_references (
             reference_id, student_id, content_id, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, student_str, content_str, status_str, at_str],
        )?;
        tx.execute(
          "INSERT INTO status_changes (reference_id, from_status, to_status, actor, changed_at)
           VALUES (?1, NULL, ?2, ?3, ?4)",
          rusqlite::params![id_str, status_str, actor_str, at_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(reference)
  }

  async fn get_reference(&self, id: Uuid) -> Result<Option<AchievementReference>> {
    let id_str = encode_uuid(id);
    let raw = self.conn.call(move |conn| Ok(select_live(conn, &id_str)?)).await?;
    raw.map(RawReference::into_reference).transpose()
  }

  async fn list_references(&self, query: &ReferenceQuery) -> Result<Vec<AchievementReference>> {
    let mut conds = vec!["deleted_at IS NULL".to_owned()];
    let mut params: Vec<Value> = Vec::new();

    if let Scope::Students(ids) = &query.scope {
      if ids.is_empty() {
        return Ok(Vec::new());
      }
      let marks = vec!["?"; ids.len()].join(", ");
      conds.push(format!("student_id IN ({marks})"));
      params.extend(ids.iter().map(|id| Value::Text(encode_uuid(*id))));
    }
    if let Some(status) = query.status {
      conds.push("status = ?".to_owned());
      params.push(Value::Text(encode_status(status).to_owned()));
    }
    params.push(Value::Integer(clamp_i64(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))));
    params.push(Value::Integer(clamp_i64(query.offset.unwrap_or(0))));

    let sql = format!(
      "SELECT {REFERENCE_COLUMNS} FROM achievement_references
       WHERE {}
       ORDER BY created_at, rowid
       LIMIT ? OFFSET ?",
      conds.join(" AND ")
    );

    let raws: Vec<RawReference> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReference::into_reference).collect()
  }

  async fn update_workflow(
    &self,
    id: Uuid,
    next: WorkflowState,
    actor: Uuid,
  ) -> Result<Option<AchievementReference>> {
    let id_str        = encode_uuid(id);
    let status_str    = encode_status(next.status);
    let submitted_str = next.submitted_at.map(encode_dt);
    let verified_str  = next.verified_at.map(encode_dt);
    let verifier_str  = next.verified_by.map(encode_uuid);
    let note          = next.rejection_note;
    let actor_str     = encode_uuid(actor);
    let at_str        = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let from: Option<String> = tx
          .query_row(
            "SELECT status FROM achievement_references
             WHERE reference_id = ?1 AND deleted_at IS NULL",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(from) = from else { return Ok(None) };

        tx.execute(
          "UPDATE achievement_references
           SET status = ?2, submitted_at = ?3, verified_at = ?4, verified_by = ?5,
               rejection_note = ?6, updated_at = ?7
           WHERE reference_id = ?1",
          rusqlite::params![
            id_str,
            status_str,
            submitted_str,
            verified_str,
            verifier_str,
            note,
            at_str,
          ],
        )?;
        tx.execute(
          "INSERT INTO status_changes (reference_id, from_status, to_status, actor, note, changed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, from, status_str, actor_str, note, at_str],
        )?;
        let raw = select_live(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawReference::into_reference).transpose()
  }

  async fn touch(&self, id: Uuid) -> Result<Option<AchievementReference>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE achievement_references SET updated_at = ?2
           WHERE reference_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(select_live(conn, &id_str)?)
      })
      .await?;

    raw.map(RawReference::into_reference).transpose()
  }

  async fn soft_delete(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE achievement_references SET deleted_at = ?2, updated_at = ?2
           WHERE reference_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>> {
    let id_str = encode_uuid(id);

    let raws: Vec<RawStatusChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.reference_id, c.from_status, c.to_status, c.actor, c.note, c.changed_at
           FROM status_changes c
           JOIN achievement_references r ON r.reference_id = c.reference_id
           WHERE c.reference_id = ?1 AND r.deleted_at IS NULL
           ORDER BY c.change_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawStatusChange {
              reference_id: row.get(0)?,
              from_status:  row.get(1)?,
              to_status:    row.get(2)?,
              actor:        row.get(3)?,
              note:         row.get(4)?,
              changed_at:   row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStatusChange::into_change).collect()
  }

  async fn live_content_ids(&self) -> Result<Vec<(Uuid, ContentId)>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT reference_id, content_id FROM achievement_references
           WHERE deleted_at IS NULL",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(r, c)| Ok((decode_uuid(&r)?, ContentId::new(c))))
      .collect()
  }
}

// ─── Directory impl ──────────────────────────────────────────────────────────

impl Directory for SqliteStore {
  type Error = crate::Error;

  async fn student_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>> {
    let user_str = encode_uuid(user_id);

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT student_id FROM students WHERE user_id = ?1",
              rusqlite::params![user_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.as_deref().map(decode_uuid).transpose()
  }

  async fn advisees_of(&self, user_id: Uuid) -> Result<BTreeSet<Uuid>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.student_id FROM students s
           JOIN lecturers l ON l.lecturer_id = s.advisor_id
           WHERE l.user_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.iter().map(|s| decode_uuid(s)).collect()
  }
}
