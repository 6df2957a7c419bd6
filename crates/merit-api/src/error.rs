//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use merit_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] merit_core::Error),

  /// Identity headers missing or malformed.
  #[error("unauthenticated: {0}")]
  Unauthenticated(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("upload exceeds {limit} bytes")]
  PayloadTooLarge { limit: usize },

  #[error("upload storage error: {0}")]
  Storage(#[from] std::io::Error),
}

impl ApiError {
  fn status_and_kind(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::Core(e) => {
        let status = match e.kind() {
          ErrorKind::Validation => StatusCode::BAD_REQUEST,
          ErrorKind::Forbidden => StatusCode::FORBIDDEN,
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::Conflict => StatusCode::CONFLICT,
          ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
          ErrorKind::Dependency => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, e.kind().into())
      }
      ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation"),
      ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "validation"),
      ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind) = self.status_and_kind();
    if status.is_server_error() {
      tracing::warn!(%status, kind, error = %self, "request failed");
    }
    (status, Json(json!({ "kind": kind, "error": self.to_string() }))).into_response()
  }
}
