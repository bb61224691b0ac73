use axum::{
  Json, Router,
  routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod consolidate;
mod metrics;
mod patterns;
mod rollback;

pub use consolidate::{Consolidate, ConsolidateResult};
pub use rollback::Rollback;

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Comversa Consolidation API",
    version = "0.1.0",
    description = "Deduplicated, source-tracked knowledge graph over Spanish manager interviews"
  ),
  paths(
    consolidate::consolidate,
    patterns::identify_patterns,
    rollback::rollback,
    metrics::metrics,
  ),
  components(schemas(
    Consolidate,
    ConsolidateResult,
    Rollback,
    comversa_core::ConsolidationOutcome,
    comversa_core::ExtractedEntity,
    comversa_core::EntityType,
    comversa_core::Pattern,
    comversa_core::MetricsSnapshot,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route("/api/v0/consolidate", post(consolidate::consolidate))
    .route(
      "/api/v0/identify_patterns",
      post(patterns::identify_patterns),
    )
    .route("/api/v0/rollback", post(rollback::rollback))
    .route("/api/v0/metrics", get(metrics::metrics))
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
