use std::sync::Arc;

use apalis_postgres::PostgresStorage;
use comversa_core::{
  ConsolidationAgent, EntityStore, MetricsRegistry, PatternRecognizer, RollbackService,
};
use comversa_worker::WorkerJob;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn EntityStore>,
  pub agent: Arc<ConsolidationAgent>,
  pub recognizer: Arc<PatternRecognizer>,
  pub rollback: Arc<RollbackService>,
  pub metrics: Arc<MetricsRegistry>,
  pub job_storage: PostgresStorage<WorkerJob>,
}

impl AppState {
  #[must_use]
  pub fn new(
    store: Arc<dyn EntityStore>,
    agent: Arc<ConsolidationAgent>,
    recognizer: Arc<PatternRecognizer>,
    rollback: Arc<RollbackService>,
    metrics: Arc<MetricsRegistry>,
    job_storage: PostgresStorage<WorkerJob>,
  ) -> Self {
    Self {
      store,
      agent,
      recognizer,
      rollback,
      metrics,
      job_storage,
    }
  }
}
