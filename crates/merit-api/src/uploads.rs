//! Local file storage for attachment uploads.
//!
//! The handler asks the orchestrator whether the caller may attach before
//! any bytes touch disk. Files are then written under a root directory as
//! `{achievement id}-{sha256 prefix}-{nonce}-{sanitised name}`; the nonce
//! gives every request its own file, so removing it after a failed append
//! never touches a file another request attached.

use std::{
  io,
  path::{Path as FsPath, PathBuf},
};

use axum::{
  Json,
  extract::{Path, State, rejection::BytesRejection},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use merit_core::{
  access::Capability,
  achievement::Attachment,
  store::{ContentStore, Directory, ReferenceStore},
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::Identity};

pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Public path prefix under which stored files are served.
pub const URL_PREFIX: &str = "/uploads";

const MAX_NAME_LEN: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A directory of uploaded attachment files.
#[derive(Debug, Clone)]
pub struct UploadStore {
  root:      PathBuf,
  max_bytes: usize,
}

/// Where [`UploadStore::save`] put a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
  pub path: PathBuf,
  pub url:  String,
}

impl UploadStore {
  /// Use `root` for uploads, creating it if needed.
  pub async fn open(root: impl Into<PathBuf>, max_bytes: usize) -> io::Result<Self> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await?;
    Ok(Self { root, max_bytes })
  }

  pub fn root(&self) -> &FsPath { &self.root }

  pub fn max_bytes(&self) -> usize { self.max_bytes }

  pub async fn save(&self, owner: Uuid, file_name: &str, data: &[u8]) -> io::Result<StoredFile> {
    let digest = hex::encode(Sha256::digest(data));
    let nonce = Uuid::new_v4().simple().to_string();
    let stored_name = format!(
      "{}-{}-{}-{}",
      owner.simple(),
      &digest[..16],
      &nonce[..8],
      sanitize(file_name)
    );
    let path = self.root.join(&stored_name);
    tokio::fs::write(&path, data).await?;
    Ok(StoredFile { path, url: format!("{URL_PREFIX}/{stored_name}") })
  }

  /// Remove a file written by [`Self::save`]. Best-effort: failures are
  /// logged, not returned.
  pub async fn discard(&self, stored: &StoredFile) {
    if let Err(e) = tokio::fs::remove_file(&stored.path).await {
      warn!(path = %stored.path.display(), error = %e, "failed to remove rejected upload");
    }
  }
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`, without leading
/// dots, at most [`MAX_NAME_LEN`] characters.
pub fn sanitize(name: &str) -> String {
  let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
  let cleaned: String = base
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
    .collect();
  let cleaned = cleaned.trim_start_matches('.');
  let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();
  if cleaned.is_empty() { "file".to_owned() } else { cleaned }
}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// `POST /achievements/{id}/attachments` with the raw file as the body.
///
/// Requires `X-File-Name`; `Content-Type` defaults to
/// `application/octet-stream`. Returns 201 with the attachment metadata.
pub async fn upload<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  payload: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  caller.require(Capability::UploadAttachment)?;

  let limit = state.uploads.max_bytes();
  let data = payload.map_err(|e| {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      ApiError::PayloadTooLarge { limit }
    } else {
      ApiError::BadRequest(e.body_text())
    }
  })?;
  if data.len() > limit {
    return Err(ApiError::PayloadTooLarge { limit });
  }
  if data.is_empty() {
    return Err(ApiError::BadRequest("empty upload".into()));
  }

  let file_name = headers
    .get(FILE_NAME_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or_else(|| ApiError::BadRequest(format!("missing {FILE_NAME_HEADER} header")))?
    .to_owned();
  let file_type = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("application/octet-stream")
    .to_owned();

  state.service.check_attachable(id, &caller).await?;
  let stored = state.uploads.save(id, &file_name, &data).await?;
  let attachment = Attachment {
    file_name,
    file_url: stored.url.clone(),
    file_type,
    uploaded_at: Utc::now(),
  };

  match state.service.append_attachment(id, &caller, attachment).await {
    Ok(attachment) => {
      info!(reference_id = %id, url = %attachment.file_url, bytes = data.len(), "upload stored");
      Ok((StatusCode::CREATED, Json(attachment)))
    }
    Err(e) => {
      state.uploads.discard(&stored).await;
      Err(e.into())
    }
  }
}
