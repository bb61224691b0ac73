use std::collections::BTreeMap;

use apalis::prelude::TaskSink;
use axum::{Json, extract::State};
use comversa_core::{ConsolidationInput, ConsolidationOutcome, EntityType, ExtractedEntity};
use comversa_shared::AppError;
use comversa_worker::{ConsolidateInterviewJob, WorkerJob};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Consolidate {
  /// Opaque identifier, unique per interview
  pub interview_id: String,
  /// Extracted entities keyed by type tag (closed set)
  pub entities: BTreeMap<String, Vec<ExtractedEntity>>,
  /// Queue the consolidation as a background job instead of running inline
  #[serde(default)]
  pub enqueue: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ConsolidateResult {
  Completed(ConsolidationOutcome),
  Enqueued { interview_id: String, enqueued: bool },
}

/// Consolidate one interview's extracted entities
#[utoipa::path(
  post,
  path = "/api/v0/consolidate",
  request_body = Consolidate,
  responses(
    (status = 200, description = "Consolidation finished or enqueued", body = ConsolidateResult),
    (status = 400, description = "Unknown entity type or empty entity name"),
    (status = 503, description = "Embedding provider unavailable"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(interview_id = %payload.interview_id))]
pub async fn consolidate(
  State(state): State<AppState>,
  Json(payload): Json<Consolidate>,
) -> Result<Json<ConsolidateResult>, AppError> {
  // Validate every type tag against the closed set before anything else.
  let mut entities_by_type: BTreeMap<EntityType, Vec<ExtractedEntity>> = BTreeMap::new();
  for (tag, entities) in payload.entities {
    let entity_type = EntityType::parse(&tag).map_err(AppError::domain)?;
    entities_by_type.entry(entity_type).or_default().extend(entities);
  }

  let input = ConsolidationInput {
    interview_id: payload.interview_id.clone(),
    entities_by_type,
  };

  if payload.enqueue {
    let mut job_storage = state.job_storage.clone();
    job_storage
      .push(WorkerJob::Consolidate(ConsolidateInterviewJob { input }))
      .await?;
    return Ok(Json(ConsolidateResult::Enqueued {
      interview_id: payload.interview_id,
      enqueued: true,
    }));
  }

  let outcome = state
    .agent
    .consolidate(&input)
    .await
    .map_err(AppError::domain)?;

  Ok(Json(ConsolidateResult::Completed(outcome)))
}
