use std::{
  backtrace::{Backtrace, BacktraceStatus},
  fmt::Display,
};

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use uuid::Uuid;

// ──────────────────────────────────────────────────
// Storage errors
// ──────────────────────────────────────────────────

/// Error surfaced by an `EntityStore` adapter.
///
/// `Transient` failures (lost connections, lock timeouts) are retried by the
/// consolidation agent before being wrapped into `ConsolidationError::Failed`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("transient store error: {0}")]
  Transient(String),

  #[error("store error: {0}")]
  Fatal(String),

  #[error("not found: {0}")]
  NotFound(String),
}

impl StoreError {
  #[must_use]
  pub const fn is_transient(&self) -> bool {
    matches!(self, Self::Transient(_))
  }
}

// ──────────────────────────────────────────────────
// Domain error taxonomy
// ──────────────────────────────────────────────────

/// The consolidation core's error kinds.
///
/// `EmbeddingUnavailable` is recovered locally (name-only matching) and never
/// aborts a consolidation; everything else propagates with a correlation id.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
  #[error("unknown entity type: {0:?}")]
  InvalidEntityType(String),

  #[error("entity name is empty after normalization: {0:?}")]
  InvalidEntityName(String),

  #[error("embedding provider unavailable")]
  EmbeddingUnavailable,

  #[error("audit record {0} was already rolled back")]
  AlreadyRolledBack(Uuid),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("consolidation timed out after {0} seconds")]
  Timeout(u64),

  #[error("consolidation failed (correlation id {correlation_id}): {source}")]
  Failed {
    correlation_id: Uuid,
    #[source]
    source: Box<ConsolidationError>,
  },
}

impl ConsolidationError {
  /// Wrap an error that aborted a consolidation after its transaction was
  /// rolled back.
  #[must_use]
  pub fn failed(correlation_id: Uuid, source: Self) -> Self {
    Self::Failed {
      correlation_id,
      source: Box::new(source),
    }
  }

  fn status_code(&self) -> StatusCode {
    match self {
      Self::InvalidEntityType(_) | Self::InvalidEntityName(_) => StatusCode::BAD_REQUEST,
      Self::AlreadyRolledBack(_) => StatusCode::CONFLICT,
      Self::EmbeddingUnavailable => StatusCode::SERVICE_UNAVAILABLE,
      Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
      Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      Self::Failed { source, .. } => source.status_code(),
    }
  }
}

// ──────────────────────────────────────────────────
// HTTP boundary error
// ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct AppError {
  err: anyhow::Error,
  status_code: StatusCode,
}

impl AppError {
  /// Create with 500 status
  pub fn new<E: Into<anyhow::Error>>(err: E) -> Self {
    Self {
      err: err.into(),
      status_code: StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Create with custom status
  pub fn with_status<E: Into<anyhow::Error>>(status: StatusCode, err: E) -> Self {
    Self {
      err: err.into(),
      status_code: status,
    }
  }

  /// Create from a domain error, mapping its kind to an HTTP status.
  #[must_use]
  pub fn domain(err: ConsolidationError) -> Self {
    let status = err.status_code();
    Self::with_status(status, err)
  }

  #[must_use]
  pub const fn status_code(&self) -> StatusCode {
    self.status_code
  }

  /// Get backtrace from anyhow (requires `RUST_BACKTRACE=1` to capture)
  pub fn backtrace(&self) -> &Backtrace {
    self.err.backtrace()
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let body = if cfg!(debug_assertions) {
      let bt = self.err.backtrace();
      if bt.status() == BacktraceStatus::Captured {
        format!("{}\nBacktrace:\n{}", self.err, bt)
      } else {
        format!(
          "{}\n(hint: set RUST_BACKTRACE=1 to enable backtrace)",
          self.err
        )
      }
    } else {
      self.err.to_string()
    };
    (self.status_code, body).into_response()
  }
}

impl Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.status_code, self.err)
  }
}

impl<E> From<E> for AppError
where
  E: Into<anyhow::Error>,
{
  fn from(err: E) -> Self {
    Self::new(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn domain_errors_map_to_statuses() {
    let cases = [
      (
        ConsolidationError::InvalidEntityType("gadget".into()),
        StatusCode::BAD_REQUEST,
      ),
      (
        ConsolidationError::InvalidEntityName(String::new()),
        StatusCode::BAD_REQUEST,
      ),
      (
        ConsolidationError::EmbeddingUnavailable,
        StatusCode::SERVICE_UNAVAILABLE,
      ),
      (
        ConsolidationError::AlreadyRolledBack(Uuid::nil()),
        StatusCode::CONFLICT,
      ),
      (ConsolidationError::Timeout(300), StatusCode::GATEWAY_TIMEOUT),
    ];

    for (err, status) in cases {
      assert_eq!(AppError::domain(err).status_code(), status);
    }
  }

  #[test]
  fn failed_wrapper_keeps_inner_status() {
    let inner = ConsolidationError::InvalidEntityType("foo".into());
    let wrapped = ConsolidationError::failed(Uuid::now_v7(), inner);
    assert_eq!(
      AppError::domain(wrapped).status_code(),
      StatusCode::BAD_REQUEST
    );
  }
}
