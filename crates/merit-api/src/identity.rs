//! Caller identity extractor.
//!
//! The upstream auth layer forwards the authenticated user in `x-user-id` and
//! the user's permission strings in `x-capabilities` (comma- or
//! whitespace-separated, header may repeat). Unknown permission strings are
//! ignored.

use axum::{extract::FromRequestParts, http::request::Parts};
use merit_core::access::{Caller, CapabilitySet};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CAPABILITIES_HEADER: &str = "x-capabilities";

/// The authenticated caller of a request.
pub struct Identity(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let user_id = parts
      .headers
      .get(USER_ID_HEADER)
      .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?
      .to_str()
      .ok()
      .and_then(|v| Uuid::parse_str(v.trim()).ok())
      .ok_or_else(|| ApiError::Unauthenticated(format!("malformed {USER_ID_HEADER} header")))?;

    let capabilities = CapabilitySet::from_permissions(
      parts
        .headers
        .get_all(CAPABILITIES_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|p| !p.is_empty()),
    );

    Ok(Identity(Caller { user_id, capabilities }))
  }
}
