use axum::{Json, extract::State};
use comversa_core::MetricsSnapshot;
use comversa_shared::AppError;

use crate::utils::AppState;

/// Flat snapshot of the consolidation metrics registry
#[utoipa::path(
  get,
  path = "/api/v0/metrics",
  responses(
    (status = 200, description = "Current counters, timers, and aggregates", body = MetricsSnapshot),
  )
)]
#[axum::debug_handler]
pub async fn metrics(State(state): State<AppState>) -> Result<Json<MetricsSnapshot>, AppError> {
  Ok(Json(state.metrics.snapshot()))
}
