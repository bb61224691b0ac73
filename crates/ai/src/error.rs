use std::time::Duration;

/// Failure modes of the embedding envelope.
///
/// `Unavailable` means the circuit breaker is open; callers fall back to
/// name-only similarity instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
  #[error("embedding provider unavailable (circuit open)")]
  Unavailable,

  #[error("embedding call timed out after {0:?}")]
  Timeout(Duration),

  #[error("upstream embedding failure: {0}")]
  Upstream(String),

  #[error("invalid embedding response: {0}")]
  Invalid(String),
}

impl EmbedError {
  /// Whether a retry could plausibly succeed.
  #[must_use]
  pub const fn is_retryable(&self) -> bool {
    matches!(self, Self::Timeout(_) | Self::Upstream(_))
  }
}
