use std::sync::Arc;

use apalis_postgres::PostgresStorage;
use comversa_ai::{Embedder, OpenAiEmbedder, ResilientEmbedder};
use comversa_core::{
  ConsolidationAgent, ConsolidationConfig, DuplicateDetector, MetricsRegistry, PatternRecognizer,
  RollbackService,
};
use comversa_migration::{Migrator, MigratorTrait};
use comversa_server::{server, utils::AppState};
use comversa_shared::{AppEnv, AppError};
use comversa_store::PgEntityStore;
use comversa_worker::{WorkerContext, WorkerJob, worker};
use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let app_env = AppEnv::load()?;
  let db = Database::connect(app_env.database_url.as_str()).await?;

  // Apply all pending migrations
  // https://www.sea-ql.org/SeaORM/docs/migration/running-migration/#migrating-programmatically
  Migrator::up(&db, None).await?;
  PostgresStorage::setup(&db.get_postgres_connection_pool()).await?;
  let job_storage = PostgresStorage::<WorkerJob>::new(db.get_postgres_connection_pool());

  // Process-wide shared state, constructed once and passed in.
  let config = Arc::new(ConsolidationConfig::default());
  let embedder = ResilientEmbedder::new(
    OpenAiEmbedder::new(app_env.embeddings),
    config.resilience_options(),
  );
  let embedding_stats = embedder.stats();
  let embedder: Arc<dyn Embedder> = Arc::new(embedder);
  let metrics = Arc::new(MetricsRegistry::new(embedding_stats));

  let store = Arc::new(PgEntityStore::new(db.clone()));
  let detector = DuplicateDetector::new(Arc::clone(&config), Arc::clone(&embedder));
  let agent = Arc::new(ConsolidationAgent::new(
    store.clone(),
    detector,
    Arc::clone(&config),
    Arc::clone(&metrics),
  ));
  let recognizer = Arc::new(PatternRecognizer::new(Arc::clone(&config)));
  let rollback = Arc::new(RollbackService::new(store.clone()));

  let worker_ctx = WorkerContext {
    store: store.clone(),
    agent: Arc::clone(&agent),
    recognizer: Arc::clone(&recognizer),
  };
  let app_state = AppState::new(
    store,
    agent,
    recognizer,
    rollback,
    metrics,
    job_storage.clone(),
  );

  let _ = tokio::try_join!(worker(worker_ctx, job_storage), server(app_state));

  Ok(())
}
