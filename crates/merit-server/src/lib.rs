//! Wiring for the Merit server: configuration and store construction.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use merit_api::{AppState, UploadStore};
use merit_core::AchievementService;
use merit_store_docs::DocumentStore;
use merit_store_sqlite::SqliteStore;
use serde::Deserialize;

/// The orchestrator over the concrete SQLite-backed stores.
pub type Service = AchievementService<SqliteStore, DocumentStore, SqliteStore>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `merit.toml` and `MERIT_*`
/// environment variables. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  /// SQLite file holding references, history and the directory.
  pub reference_db:      PathBuf,
  /// SQLite file holding content documents.
  pub content_db:        PathBuf,
  pub upload_dir:        PathBuf,
  pub max_upload_bytes:  usize,
  pub store_timeout_ms:  u64,
  /// Content younger than this is never reported as orphaned.
  pub orphan_grace_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".to_owned(),
      port:              8080,
      reference_db:      PathBuf::from("merit.db"),
      content_db:        PathBuf::from("merit-content.db"),
      upload_dir:        PathBuf::from("uploads"),
      max_upload_bytes:  10 * 1024 * 1024,
      store_timeout_ms:  5_000,
      orphan_grace_secs: 3_600,
    }
  }
}

impl ServerConfig {
  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

  pub fn orphan_grace(&self) -> Duration { Duration::from_secs(self.orphan_grace_secs) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Open both stores and build the orchestrator.
pub async fn open_service(cfg: &ServerConfig) -> anyhow::Result<Service> {
  let references = SqliteStore::open(&cfg.reference_db)
    .await
    .with_context(|| format!("failed to open reference store at {:?}", cfg.reference_db))?;
  let contents = DocumentStore::open(&cfg.content_db)
    .await
    .with_context(|| format!("failed to open content store at {:?}", cfg.content_db))?;

  let references = Arc::new(references);
  Ok(
    AchievementService::new(references.clone(), Arc::new(contents), references)
      .with_store_timeout(cfg.store_timeout()),
  )
}

/// Build the HTTP application for `cfg`.
pub async fn app(cfg: &ServerConfig) -> anyhow::Result<axum::Router> {
  let service = open_service(cfg).await?;
  let uploads = UploadStore::open(&cfg.upload_dir, cfg.max_upload_bytes)
    .await
    .with_context(|| format!("failed to create upload dir {:?}", cfg.upload_dir))?;

  Ok(merit_api::router(AppState {
    service: Arc::new(service),
    uploads: Arc::new(uploads),
  }))
}
