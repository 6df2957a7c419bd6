//! Visibility Resolver.
//!
//! Turns a caller's capabilities into exactly one [`Scope`], in priority
//! order global > own > advisee.

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{Caller, Capability},
};

/// Which capability a scope was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
  Global,
  Own,
  Advisee,
}

/// Pick the scope kind for `caller` without touching any store.
///
/// Fails with `forbidden` when the caller holds none of the read
/// capabilities.
pub fn scope_kind(caller: &Caller) -> Result<ScopeKind> {
  let caps = &caller.capabilities;
  if caps.has(Capability::ReadList) {
    Ok(ScopeKind::Global)
  } else if caps.has(Capability::ReadOwn) {
    Ok(ScopeKind::Own)
  } else if caps.has(Capability::ReadAdvisee) {
    Ok(ScopeKind::Advisee)
  } else {
    Err(Error::Forbidden("caller may not read achievements".into()))
  }
}

/// A resolved row filter over references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  /// No restriction.
  Global,
  /// Only these students. An empty set matches nothing.
  Students(BTreeSet<Uuid>),
}

impl Scope {
  pub fn own(student_id: Option<Uuid>) -> Self {
    Self::Students(student_id.into_iter().collect())
  }

  pub fn permits(&self, student_id: Uuid) -> bool {
    match self {
      Self::Global => true,
      Self::Students(ids) => ids.contains(&student_id),
    }
  }

  /// True when the scope can never match a record.
  pub fn is_empty(&self) -> bool { matches!(self, Self::Students(ids) if ids.is_empty()) }
}
