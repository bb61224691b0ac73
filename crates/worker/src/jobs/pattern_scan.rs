use comversa_shared::AppError;
use serde::{Deserialize, Serialize};

use crate::{WorkerContext, WorkerError};

// ──────────────────────────────────────────────────
// Job definition
// ──────────────────────────────────────────────────

/// Recompute recurring-pain and problematic-system patterns over the whole
/// store, replacing the previous rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternScanJob {}

// ──────────────────────────────────────────────────
// Job processing
// ──────────────────────────────────────────────────

pub async fn process_pattern_scan(
  _job: PatternScanJob,
  ctx: WorkerContext,
) -> Result<(), WorkerError> {
  let patterns = ctx
    .recognizer
    .scan_and_store(ctx.store.as_ref())
    .await
    .map_err(AppError::domain)?;

  tracing::info!(patterns = patterns.len(), "pattern scan stored");

  // Orphan relationships are reported, never purged.
  let orphans = ctx
    .store
    .find_orphan_relationships()
    .await
    .map_err(|err| AppError::domain(err.into()))?;
  for orphan in &orphans {
    tracing::warn!(
      relationship_id = %orphan.id,
      source = %orphan.source_entity_id,
      target = %orphan.target_entity_id,
      "orphan relationship detected"
    );
  }

  Ok(())
}
