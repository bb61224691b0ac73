use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::{Monitor, WorkerBuilder};
use apalis_postgres::PostgresStorage;
use comversa_core::{ConsolidationAgent, EntityStore, PatternRecognizer};
use comversa_shared::AppError;

mod jobs;
pub use jobs::{ConsolidateInterviewJob, PatternScanJob, WorkerJob};

/// Error type for the apalis job boundary.
/// Jobs internally use `AppError`; this wrapper converts at the worker boundary.
#[derive(Debug)]
pub struct WorkerError(pub AppError);

impl std::fmt::Display for WorkerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

impl std::error::Error for WorkerError {}

impl From<AppError> for WorkerError {
  fn from(err: AppError) -> Self {
    Self(err)
  }
}

// Enable `?` to automatically convert anyhow errors in job functions
impl From<anyhow::Error> for WorkerError {
  fn from(err: anyhow::Error) -> Self {
    Self(AppError::new(err))
  }
}

/// Everything the jobs need, constructed once at the entry point.
#[derive(Clone)]
pub struct WorkerContext {
  pub store: Arc<dyn EntityStore>,
  pub agent: Arc<ConsolidationAgent>,
  pub recognizer: Arc<PatternRecognizer>,
}

pub async fn worker(
  ctx: WorkerContext,
  backend: PostgresStorage<WorkerJob>,
) -> Result<(), AppError> {
  Monitor::new()
    .register(move |_run_id| {
      let ctx = ctx.clone();

      WorkerBuilder::new("comversa-worker")
        .backend(backend.clone())
        .build(move |job: WorkerJob| {
          let ctx = ctx.clone();
          async move {
            match job {
              WorkerJob::Consolidate(job) => jobs::process_consolidate_interview(job, ctx).await,
              WorkerJob::PatternScan(job) => jobs::process_pattern_scan(job, ctx).await,
            }
          }
        })
    })
    .shutdown_timeout(Duration::from_secs(5))
    .run_with_signal(tokio::signal::ctrl_c())
    .await
    .map_err(|err| AppError::from(anyhow::Error::new(err)))?;

  Ok(())
}
