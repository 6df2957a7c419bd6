//! The merged read model returned to callers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  achievement::{
    AchievementContent, AchievementDetails, AchievementKind, Attachment, ContentId,
  },
  reference::{AchievementReference, WorkflowState},
};

/// One logical achievement: workflow fields from the reference, substance
/// from the content. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementView {
  pub id:          Uuid,
  pub student_id:  Uuid,
  pub content_id:  ContentId,
  #[serde(flatten)]
  pub workflow:    WorkflowState,
  #[serde(rename = "type")]
  pub kind:        AchievementKind,
  pub title:       String,
  pub description: String,
  pub details:     AchievementDetails,
  pub attachments: Vec<Attachment>,
  pub tags:        BTreeSet<String>,
  pub points:      u32,
  pub created_at:  DateTime<Utc>,
  /// The later of the two records' modification times.
  pub updated_at:  DateTime<Utc>,
}

impl AchievementView {
  /// Merge a reference with its content. Pure; the result depends only on
  /// the two inputs.
  pub fn merge(reference: &AchievementReference, content: &AchievementContent) -> Self {
    Self {
      id:          reference.id,
      student_id:  reference.student_id,
      content_id:  reference.content_id.clone(),
      workflow:    reference.workflow.clone(),
      kind:        content.kind(),
      title:       content.title.clone(),
      description: content.description.clone(),
      details:     content.details.clone(),
      attachments: content.attachments.clone(),
      tags:        content.tags.clone(),
      points:      content.points,
      created_at:  reference.created_at,
      updated_at:  reference.updated_at.max(content.updated_at),
    }
  }
}
