use comversa_core::ConsolidationInput;
use comversa_shared::AppError;
use serde::{Deserialize, Serialize};

use crate::{WorkerContext, WorkerError};

// ──────────────────────────────────────────────────
// Job definition
// ──────────────────────────────────────────────────

/// Consolidate one interview's extracted entities in the background.
/// Interviews parallelize at job granularity; each job is one atomic
/// consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateInterviewJob {
  pub input: ConsolidationInput,
}

// ──────────────────────────────────────────────────
// Job processing
// ──────────────────────────────────────────────────

pub async fn process_consolidate_interview(
  job: ConsolidateInterviewJob,
  ctx: WorkerContext,
) -> Result<(), WorkerError> {
  if job.input.entities_by_type.values().all(Vec::is_empty) {
    tracing::debug!(
      interview_id = %job.input.interview_id,
      "no extracted entities, skipping consolidation"
    );
    return Ok(());
  }

  tracing::info!(
    interview_id = %job.input.interview_id,
    types = job.input.entities_by_type.len(),
    "processing interview consolidation"
  );

  let outcome = ctx
    .agent
    .consolidate(&job.input)
    .await
    .map_err(AppError::domain)?;

  tracing::info!(
    interview_id = %outcome.interview_id,
    entities = outcome.entity_ids_by_type.values().map(Vec::len).sum::<usize>(),
    "interview consolidation finished"
  );

  Ok(())
}
