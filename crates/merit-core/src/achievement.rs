//! Achievement content: the document half of an achievement.
//!
//! Content is authoritative for substance: title, type-specific details,
//! attachments, tags and points. It is keyed by an opaque [`ContentId`]
//! generated by the content store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque identifier of a content document.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ContentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Level & points ──────────────────────────────────────────────────────────

/// Points awarded when no level (or an unrecognised one) is given.
pub const DEFAULT_POINTS: u32 = 0;

/// The scope at which an achievement was earned.
///
/// Serialised with the institution's own labels (`"Nasional"`, ...); English
/// spellings are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Level {
  International,
  National,
  Provincial,
  University,
  Other(String),
}

impl Level {
  /// Fixed points lookup.
  pub fn points(&self) -> u32 {
    match self {
      Self::International => 100,
      Self::National => 50,
      Self::Provincial => 25,
      Self::University => 10,
      Self::Other(_) => DEFAULT_POINTS,
    }
  }
}

impl From<String> for Level {
  fn from(s: String) -> Self {
    match s.trim().to_lowercase().as_str() {
      "internasional" | "international" => Self::International,
      "nasional" | "national" => Self::National,
      "provinsi" | "provincial" | "province" => Self::Provincial,
      "universitas" | "university" => Self::University,
      _ => Self::Other(s),
    }
  }
}

impl From<&str> for Level {
  fn from(s: &str) -> Self { Self::from(s.to_owned()) }
}

impl From<Level> for String {
  fn from(level: Level) -> Self {
    match level {
      Level::International => "Internasional".to_owned(),
      Level::National => "Nasional".to_owned(),
      Level::Provincial => "Provinsi".to_owned(),
      Level::University => "Universitas".to_owned(),
      Level::Other(s) => s,
    }
  }
}

// ─── Details ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitionDetails {
  pub competition_name: Option<String>,
  pub level:            Option<Level>,
  /// Final placing, 1 is first place.
  pub rank:             Option<u32>,
  pub medal_type:       Option<String>,
  pub event_date:       Option<NaiveDate>,
  pub location:         Option<String>,
  pub organizer:        Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationDetails {
  /// Journal, conference, book chapter, ...
  pub publication_type:  Option<String>,
  pub publication_title: Option<String>,
  #[serde(default)]
  pub authors:           Vec<String>,
  pub publisher:         Option<String>,
  pub issn:              Option<String>,
  pub level:             Option<Level>,
  pub published_on:      Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDetails {
  pub organization_name: Option<String>,
  pub position:          Option<String>,
  pub level:             Option<Level>,
  pub period_start:      Option<NaiveDate>,
  pub period_end:        Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationDetails {
  pub certification_name:   Option<String>,
  pub issued_by:            Option<String>,
  pub certification_number: Option<String>,
  pub level:                Option<Level>,
  pub valid_until:          Option<NaiveDate>,
}

/// Free-form details for achievement types without a dedicated shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherDetails {
  #[serde(flatten)]
  pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Type-dependent attribute bag. The variant doubles as the achievement type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AchievementDetails {
  Competition(CompetitionDetails),
  Publication(PublicationDetails),
  Organization(OrganizationDetails),
  Certification(CertificationDetails),
  Other(OtherDetails),
}

/// Achievement category, derived from [`AchievementDetails`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AchievementKind {
  Competition,
  Publication,
  Organization,
  Certification,
  Other,
}

impl AchievementDetails {
  pub fn kind(&self) -> AchievementKind {
    match self {
      Self::Competition(_) => AchievementKind::Competition,
      Self::Publication(_) => AchievementKind::Publication,
      Self::Organization(_) => AchievementKind::Organization,
      Self::Certification(_) => AchievementKind::Certification,
      Self::Other(_) => AchievementKind::Other,
    }
  }

  /// The level the achievement was earned at, if the details carry one.
  pub fn level(&self) -> Option<Level> {
    match self {
      Self::Competition(d) => d.level.clone(),
      Self::Publication(d) => d.level.clone(),
      Self::Organization(d) => d.level.clone(),
      Self::Certification(d) => d.level.clone(),
      Self::Other(d) => d
        .attributes
        .get("level")
        .and_then(serde_json::Value::as_str)
        .map(Level::from),
    }
  }

  /// Points derived from [`Self::level`].
  pub fn derived_points(&self) -> u32 {
    self.level().map_or(DEFAULT_POINTS, |l| l.points())
  }
}

// ─── Attachments ─────────────────────────────────────────────────────────────

/// Metadata for a stored proof file. File bytes live in file storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
  pub file_name:   String,
  pub file_url:    String,
  pub file_type:   String,
  pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
  pub fn validate(&self) -> Result<()> {
    if self.file_name.trim().is_empty() {
      return Err(Error::Validation("attachment file name is required".into()));
    }
    if self.file_url.trim().is_empty() {
      return Err(Error::Validation("attachment file url is required".into()));
    }
    Ok(())
  }
}

// ─── Content document ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementContent {
  pub id:          ContentId,
  /// Denormalised copy of the owning student.
  pub student_id:  Uuid,
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub details:     AchievementDetails,
  /// Append-only while the achievement is editable.
  #[serde(default)]
  pub attachments: Vec<Attachment>,
  #[serde(default)]
  pub tags:        BTreeSet<String>,
  pub points:      u32,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl AchievementContent {
  pub fn kind(&self) -> AchievementKind { self.details.kind() }
}

/// Input to [`crate::store::ContentStore::insert_content`]. The store assigns
/// the id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContent {
  pub student_id:  Uuid,
  pub title:       String,
  pub description: String,
  pub details:     AchievementDetails,
  pub tags:        BTreeSet<String>,
  pub points:      u32,
}

/// Field-level patch for a content document. `None` fields are left
/// untouched by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPatch {
  pub title:       Option<String>,
  pub description: Option<String>,
  pub details:     Option<AchievementDetails>,
  pub tags:        Option<BTreeSet<String>>,
  pub points:      Option<u32>,
}

impl ContentPatch {
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// Overwrite the present top-level fields of `doc`. Timestamps are left to
  /// the store.
  pub fn apply(self, doc: &mut AchievementContent) {
    if let Some(title) = self.title {
      doc.title = title;
    }
    if let Some(description) = self.description {
      doc.description = description;
    }
    if let Some(details) = self.details {
      doc.details = details;
    }
    if let Some(tags) = self.tags {
      doc.tags = tags;
    }
    if let Some(points) = self.points {
      doc.points = points;
    }
  }
}

// ─── Request payloads ────────────────────────────────────────────────────────

/// Caller-supplied body for creating an achievement.
#[derive(Debug, Clone, Deserialize)]
pub struct AchievementInput {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub details:     AchievementDetails,
  #[serde(default)]
  pub tags:        BTreeSet<String>,
  /// Explicit score; derived from the details' level when absent.
  pub points:      Option<u32>,
}

impl AchievementInput {
  /// Validate and build the content document for `student_id`.
  pub fn into_content(self, student_id: Uuid) -> Result<NewContent> {
    let title = normalize_title(&self.title)?;
    let tags = normalize_tags(self.tags)?;
    let points = self.points.unwrap_or_else(|| self.details.derived_points());
    Ok(NewContent {
      student_id,
      title,
      description: self.description,
      details: self.details,
      tags,
      points,
    })
  }
}

/// Caller-supplied partial body for editing an achievement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementPatch {
  pub title:       Option<String>,
  pub description: Option<String>,
  pub details:     Option<AchievementDetails>,
  pub tags:        Option<BTreeSet<String>>,
  pub points:      Option<u32>,
}

impl AchievementPatch {
  /// Validate and build the content patch. New details without explicit
  /// points re-derive points from the new level.
  pub fn into_content_patch(self) -> Result<ContentPatch> {
    let title = self.title.as_deref().map(normalize_title).transpose()?;
    let tags = self.tags.map(normalize_tags).transpose()?;
    let points = self
      .points
      .or_else(|| self.details.as_ref().map(AchievementDetails::derived_points));
    let patch = ContentPatch {
      title,
      description: self.description,
      details: self.details,
      tags,
      points,
    };
    if patch.is_empty() {
      return Err(Error::Validation("update contains no fields".into()));
    }
    Ok(patch)
  }
}

fn normalize_title(title: &str) -> Result<String> {
  let title = title.trim();
  if title.is_empty() {
    return Err(Error::Validation("title must not be empty".into()));
  }
  Ok(title.to_owned())
}

fn normalize_tags(tags: BTreeSet<String>) -> Result<BTreeSet<String>> {
  tags
    .into_iter()
    .map(|t| {
      let t = t.trim();
      if t.is_empty() {
        Err(Error::Validation("tags must not be empty strings".into()))
      } else {
        Ok(t.to_owned())
      }
    })
    .collect()
}
