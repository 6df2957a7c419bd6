//! Handlers for `/achievements` endpoints.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use merit_core::{
  achievement::{AchievementInput, AchievementPatch},
  reference::{Status, StatusChange},
  service::ListOptions,
  store::{ContentStore, Directory, ReferenceStore},
  view::AchievementView,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, identity::Identity};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
  payload
    .map(|Json(v)| v)
    .map_err(|e| ApiError::BadRequest(e.body_text()))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status: Option<Status>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /achievements[?status=submitted][&limit=..][&offset=..]`
pub async fn list<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<AchievementView>>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let options = ListOptions { status: params.status, limit: params.limit, offset: params.offset };
  Ok(Json(state.service.list_achievements(&caller, options).await?))
}

/// `GET /achievements/{id}`
pub async fn get_one<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<AchievementView>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  Ok(Json(state.service.get_achievement(id, &caller).await?))
}

/// `GET /achievements/{id}/history`
pub async fn history<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusChange>>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  Ok(Json(state.service.achievement_history(id, &caller).await?))
}

// ─── Owner writes ────────────────────────────────────────────────────────────

/// `POST /achievements`; returns 201 with the merged view.
pub async fn create<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  payload: Result<Json<AchievementInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  let input = body(payload)?;
  let view = state.service.create_achievement(&caller, input).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

/// `PUT /achievements/{id}` with any subset of the content fields.
pub async fn update<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
  payload: Result<Json<AchievementPatch>, JsonRejection>,
) -> Result<Json<AchievementView>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  let patch = body(payload)?;
  Ok(Json(state.service.update_achievement(id, &caller, patch).await?))
}

/// `DELETE /achievements/{id}`; returns 204.
pub async fn delete<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  state.service.delete_achievement(id, &caller).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /achievements/{id}/submit`
pub async fn submit<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<AchievementView>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  Ok(Json(state.service.submit_achievement(id, &caller).await?))
}

// ─── Review ──────────────────────────────────────────────────────────────────

/// `POST /achievements/{id}/verify`
pub async fn verify<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<AchievementView>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  Ok(Json(state.service.verify_achievement(id, &caller).await?))
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
  pub note: Option<String>,
}

/// `POST /achievements/{id}/reject` with `{"note": "..."}`. A missing or
/// unreadable body is treated as a missing note.
pub async fn reject<R, C, D>(
  State(state): State<AppState<R, C, D>>,
  Identity(caller): Identity,
  Path(id): Path<Uuid>,
  payload: Result<Json<RejectBody>, JsonRejection>,
) -> Result<Json<AchievementView>, ApiError>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  let note = payload.ok().and_then(|Json(b)| b.note);
  Ok(Json(state.service.reject_achievement(id, &caller, note).await?))
}
