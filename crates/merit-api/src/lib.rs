//! JSON REST API for Merit.
//!
//! Exposes an axum [`Router`] over an [`AchievementService`]. Authentication
//! happens upstream; this layer trusts the identity headers it is given (see
//! [`identity`]).
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET`    | `/achievements` | list (`?status`, `?limit`, `?offset`) |
//! | `POST`   | `/achievements` | create, returns 201 |
//! | `GET`    | `/achievements/{id}` | get |
//! | `PUT`    | `/achievements/{id}` | partial edit |
//! | `DELETE` | `/achievements/{id}` | delete, returns 204 |
//! | `POST`   | `/achievements/{id}/submit` | submit for review |
//! | `POST`   | `/achievements/{id}/verify` | verify |
//! | `POST`   | `/achievements/{id}/reject` | reject, body `{"note": "..."}` |
//! | `POST`   | `/achievements/{id}/attachments` | raw file upload |
//! | `GET`    | `/achievements/{id}/history` | status history |
//! | `GET`    | `/uploads/{file}` | stored attachment bytes |

pub mod achievements;
pub mod error;
pub mod identity;
pub mod uploads;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use merit_core::{
  AchievementService,
  store::{ContentStore, Directory, ReferenceStore},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use error::ApiError;
pub use uploads::UploadStore;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<R, C, D> {
  pub service: Arc<AchievementService<R, C, D>>,
  pub uploads: Arc<UploadStore>,
}

impl<R, C, D> Clone for AppState<R, C, D> {
  fn clone(&self) -> Self {
    Self { service: self.service.clone(), uploads: self.uploads.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<R, C, D>(state: AppState<R, C, D>) -> Router
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory + 'static,
{
  // The upload handler enforces its own limit and answers with JSON.
  let upload_limit = state.uploads.max_bytes().saturating_add(1);

  Router::new()
    .route(
      "/achievements",
      get(achievements::list::<R, C, D>).post(achievements::create::<R, C, D>),
    )
    .route(
      "/achievements/{id}",
      get(achievements::get_one::<R, C, D>)
        .put(achievements::update::<R, C, D>)
        .delete(achievements::delete::<R, C, D>),
    )
    .route("/achievements/{id}/submit", post(achievements::submit::<R, C, D>))
    .route("/achievements/{id}/verify", post(achievements::verify::<R, C, D>))
    .route("/achievements/{id}/reject", post(achievements::reject::<R, C, D>))
    .route("/achievements/{id}/history", get(achievements::history::<R, C, D>))
    .route(
      "/achievements/{id}/attachments",
      post(uploads::upload::<R, C, D>).layer(DefaultBodyLimit::max(upload_limit)),
    )
    .nest_service("/uploads", ServeDir::new(state.uploads.root()))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
