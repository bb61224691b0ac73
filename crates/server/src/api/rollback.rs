use axum::{Json, extract::State, http::StatusCode};
use comversa_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Rollback {
  pub audit_id: Uuid,
  pub reason: String,
}

/// Reverse one consolidation from its snapshots
#[utoipa::path(
  post,
  path = "/api/v0/rollback",
  request_body = Rollback,
  responses(
    (status = 200, description = "Consolidation reversed"),
    (status = 404, description = "Unknown audit record"),
    (status = 409, description = "Audit record was already rolled back"),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state), fields(audit_id = %payload.audit_id))]
pub async fn rollback(
  State(state): State<AppState>,
  Json(payload): Json<Rollback>,
) -> Result<StatusCode, AppError> {
  state
    .rollback
    .rollback(payload.audit_id, &payload.reason)
    .await
    .map_err(AppError::domain)?;

  Ok(StatusCode::OK)
}
