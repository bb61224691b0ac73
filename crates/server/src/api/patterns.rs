use axum::{Json, extract::State};
use comversa_core::Pattern;
use comversa_shared::AppError;

use crate::utils::AppState;

/// Recompute recurring-pain and problematic-system patterns over the whole
/// store, replacing the previous rows
#[utoipa::path(
  post,
  path = "/api/v0/identify_patterns",
  responses(
    (status = 200, description = "Fresh patterns, previous rows replaced", body = [Pattern]),
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state))]
pub async fn identify_patterns(
  State(state): State<AppState>,
) -> Result<Json<Vec<Pattern>>, AppError> {
  let patterns = state
    .recognizer
    .scan_and_store(state.store.as_ref())
    .await
    .map_err(AppError::domain)?;

  Ok(Json(patterns))
}
