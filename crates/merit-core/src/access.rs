//! Callers and capabilities.
//!
//! Capabilities arrive from the identity layer as a flat list of permission
//! strings. They are parsed once into a [`CapabilitySet`]; every policy check
//! in the crate goes through [`CapabilitySet::require`].

use std::{collections::BTreeSet, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
pub enum Capability {
  #[strum(serialize = "achievement:create")]
  #[serde(rename = "achievement:create")]
  Create,
  #[strum(serialize = "achievement:read_own")]
  #[serde(rename = "achievement:read_own")]
  ReadOwn,
  #[strum(serialize = "achievement:read_advisee")]
  #[serde(rename = "achievement:read_advisee")]
  ReadAdvisee,
  #[strum(serialize = "achievement:read_list")]
  #[serde(rename = "achievement:read_list")]
  ReadList,
  #[strum(serialize = "achievement:update")]
  #[serde(rename = "achievement:update")]
  Update,
  #[strum(serialize = "achievement:delete")]
  #[serde(rename = "achievement:delete")]
  Delete,
  #[strum(serialize = "achievement:submit")]
  #[serde(rename = "achievement:submit")]
  Submit,
  #[strum(serialize = "achievement:verify")]
  #[serde(rename = "achievement:verify")]
  Verify,
  #[strum(serialize = "achievement:reject")]
  #[serde(rename = "achievement:reject")]
  Reject,
  #[strum(serialize = "achievement:read_history")]
  #[serde(rename = "achievement:read_history")]
  ReadHistory,
  #[strum(serialize = "achievement:upload_attachment")]
  #[serde(rename = "achievement:upload_attachment")]
  UploadAttachment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
  /// Parse permission strings, silently dropping ones this crate does not
  /// know about (they belong to other subsystems).
  pub fn from_permissions<I, S>(permissions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self(
      permissions
        .into_iter()
        .filter_map(|p| Capability::from_str(p.as_ref().trim()).ok())
        .collect(),
    )
  }

  pub fn has(&self, capability: Capability) -> bool { self.0.contains(&capability) }

  pub fn require(&self, capability: Capability) -> Result<()> {
    if self.has(capability) {
      Ok(())
    } else {
      Err(Error::Forbidden(format!("missing capability {capability}")))
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ { self.0.iter().copied() }
}

impl FromIterator<Capability> for CapabilitySet {
  fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// The authenticated principal of a request, as supplied by the identity
/// layer. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub user_id:      Uuid,
  pub capabilities: CapabilitySet,
}

impl Caller {
  pub fn new(user_id: Uuid, capabilities: impl IntoIterator<Item = Capability>) -> Self {
    Self { user_id, capabilities: capabilities.into_iter().collect() }
  }

  pub fn require(&self, capability: Capability) -> Result<()> {
    self.capabilities.require(capability)
  }
}
