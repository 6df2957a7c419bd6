//! [`DocumentStore`]: the SQLite implementation of [`ContentStore`].

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use merit_core::{
  achievement::{AchievementContent, Attachment, ContentId, ContentPatch, NewContent},
  store::ContentStore,
};

use crate::{Result, schema::SCHEMA};

fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

/// JSON document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct DocumentStore {
  conn: tokio_rusqlite::Connection,
}

impl DocumentStore {
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

  /// Read-modify-write one document inside a single transaction. Returns
  /// `None` without writing if the document does not exist.
  async fn modify<F>(&self, id: &ContentId, change: F) -> Result<Option<AchievementContent>>
  where
    F: FnOnce(&mut AchievementContent) + Send + 'static,
  {
    let id_str = id.as_str().to_owned();
    let at = now();
    let at_str = encode_dt(at);

    let body: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let body: Option<String> = tx
          .query_row(
            "SELECT body FROM documents WHERE document_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(body) = body else { return Ok(None) };

        let mut doc: AchievementContent = serde_json::from_str(&body)
          .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        change(&mut doc);
        doc.updated_at = at;
        let body = serde_json::to_string(&doc)
          .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

        tx.execute(
          "UPDATE documents SET body = ?2, updated_at = ?3 WHERE document_id = ?1",
          rusqlite::params![id_str, body, at_str],
        )?;
        tx.commit()?;
        Ok(Some(body))
      })
      .await?;

    Ok(body.as_deref().map(serde_json::from_str).transpose()?)
  }
}

impl ContentStore for DocumentStore {
  type Error = crate::Error;

  async fn insert_content(&self, input: NewContent) -> Result<AchievementContent> {
    let created_at = now();
    let doc = AchievementContent {
      id: ContentId::new(Uuid::new_v4().simple().to_string()),
      student_id: input.student_id,
      title: input.title,
      description: input.description,
      details: input.details,
      attachments: Vec::new(),
      tags: input.tags,
      points: input.points,
      created_at,
      updated_at: created_at,
    };

    let id_str      = doc.id.as_str().to_owned();
    let student_str = doc.student_id.hyphenated().to_string();
    let body        = serde_json::to_string(&doc)?;
    let at_str      = encode_dt(created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (document_id, student_id, body, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![id_str, student_str, body, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(doc)
  }

  async fn get_content(&self, id: &ContentId) -> Result<Option<AchievementContent>> {
    let id_str = id.as_str().to_owned();

    let body: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT body FROM documents WHERE document_id = ?1",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(body.as_deref().map(serde_json::from_str).transpose()?)
  }

  async fn update_content(
    &self,
    id: &ContentId,
    patch: ContentPatch,
  ) -> Result<Option<AchievementContent>> {
    self.modify(id, move |doc| patch.apply(doc)).await
  }

  async fn append_attachment(
    &self,
    id: &ContentId,
    attachment: Attachment,
  ) -> Result<Option<AchievementContent>> {
    self.modify(id, move |doc| doc.attachments.push(attachment)).await
  }

  async fn delete_content(&self, id: &ContentId) -> Result<()> {
    let id_str = id.as_str().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM documents WHERE document_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_content_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<ContentId>> {
    let cutoff_str = encode_dt(cutoff);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT document_id FROM documents WHERE created_at < ?1 ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(ids.into_iter().map(ContentId::new).collect())
  }
}
