//! Cross-store integrity scan.
//!
//! Finds content documents that no live reference points at (left behind by
//! a failed compensating delete, or by a tombstoned reference whose purge
//! failed) and live references whose content has gone missing.

use std::{collections::BTreeSet, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  achievement::ContentId,
  service::{AchievementService, CONTENT_STORE, REFERENCE_STORE, bounded},
  store::{ContentStore, Directory, ReferenceStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
  pub reference_id: Uuid,
  pub content_id:   ContentId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
  /// Content older than the grace period with no live reference.
  pub orphaned_content:    Vec<ContentId>,
  /// Live references whose content does not exist.
  pub dangling_references: Vec<DanglingReference>,
}

impl IntegrityReport {
  pub fn is_clean(&self) -> bool {
    self.orphaned_content.is_empty() && self.dangling_references.is_empty()
  }
}

impl<R, C, D> AchievementService<R, C, D>
where
  R: ReferenceStore + 'static,
  C: ContentStore + 'static,
  D: Directory,
{
  /// Compare both stores.
  ///
  /// Content younger than `grace` is never reported as orphaned: it may
  /// belong to a creation whose reference insert has not landed yet.
  pub async fn scan_integrity(&self, grace: Duration) -> Result<IntegrityReport> {
    let grace = chrono::Duration::from_std(grace)
      .map_err(|_| Error::Validation("grace period out of range".into()))?;

    let live = bounded(self.timeout, REFERENCE_STORE, self.references.live_content_ids()).await?;
    let now = Utc::now();
    let existing: BTreeSet<ContentId> =
      bounded(self.timeout, CONTENT_STORE, self.contents.list_content_ids(now))
        .await?
        .into_iter()
        .collect();
    let aged = bounded(
      self.timeout,
      CONTENT_STORE,
      self.contents.list_content_ids(now - grace),
    )
    .await?;

    let referenced: BTreeSet<&ContentId> = live.iter().map(|(_, c)| c).collect();

    let orphaned_content: Vec<ContentId> =
      aged.into_iter().filter(|id| !referenced.contains(id)).collect();

    let dangling_references: Vec<DanglingReference> = live
      .iter()
      .filter(|(_, c)| !existing.contains(c))
      .map(|(r, c)| DanglingReference { reference_id: *r, content_id: c.clone() })
      .collect();

    for id in &orphaned_content {
      warn!(target: "merit::orphan", content_id = %id, "orphaned content");
    }
    for d in &dangling_references {
      warn!(
        target: "merit::integrity",
        reference_id = %d.reference_id,
        content_id = %d.content_id,
        "dangling reference"
      );
    }

    Ok(IntegrityReport { orphaned_content, dangling_references })
  }

  /// Delete every orphan listed in `report`. Returns how many were removed.
  pub async fn repair_orphans(&self, report: &IntegrityReport) -> Result<usize> {
    for id in &report.orphaned_content {
      bounded(self.timeout, CONTENT_STORE, self.contents.delete_content(id)).await?;
    }
    info!(count = report.orphaned_content.len(), "orphaned content removed");
    Ok(report.orphaned_content.len())
  }
}
