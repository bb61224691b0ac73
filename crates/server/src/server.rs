use axum::{Router, response::Html, routing::get};
use comversa_shared::AppError;
use tokio::net::TcpListener;
use tokio::signal;

use crate::{api, utils::AppState};

#[axum::debug_handler]
async fn handler() -> Html<&'static str> {
  Html("<h1>Comversa</h1>")
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// # Panics
///
/// Panics if a signal handler fails to install.
async fn shutdown_signal() {
  let ctrl_c = async {
    signal::ctrl_c()
      .await
      .expect("failed to install Ctrl+C handler");
  };

  #[cfg(unix)]
  let terminate = async {
    signal::unix::signal(signal::unix::SignalKind::terminate())
      .expect("failed to install signal handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {},
    () = terminate => {},
  }
}

pub async fn server(app_state: AppState) -> Result<(), AppError> {
  let app = Router::new()
    .route("/", get(handler))
    .merge(api::app())
    .with_state(app_state);

  let listener = TcpListener::bind("0.0.0.0:3000").await?;

  tracing::info!("server started at http://0.0.0.0:3000");

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}
