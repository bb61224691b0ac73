use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared between the embedding envelope and the metrics registry.
#[derive(Debug, Default)]
pub struct EmbeddingStats {
  pub cache_hits: AtomicU64,
  pub cache_misses: AtomicU64,
  pub upstream_failures: AtomicU64,
  pub circuit_opens: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EmbeddingStatsSnapshot {
  pub embedding_cache_hits: u64,
  pub embedding_cache_misses: u64,
  pub embedding_upstream_failures: u64,
  pub embedding_circuit_opens: u64,
}

impl EmbeddingStats {
  #[must_use]
  pub fn snapshot(&self) -> EmbeddingStatsSnapshot {
    EmbeddingStatsSnapshot {
      embedding_cache_hits: self.cache_hits.load(Ordering::Relaxed),
      embedding_cache_misses: self.cache_misses.load(Ordering::Relaxed),
      embedding_upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
      embedding_circuit_opens: self.circuit_opens.load(Ordering::Relaxed),
    }
  }
}
