use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
  CircuitBreaker, EmbedError, Embedder, EmbeddingCache, EmbeddingStats, text_hash,
};

/// Knobs for the resilience envelope. Defaults match the consolidation
/// configuration surface (3 retries, breaker at 10, 30 s timeout).
#[derive(Debug, Clone, Copy)]
pub struct ResilienceOptions {
  pub max_retries: u32,
  pub circuit_threshold: u32,
  pub circuit_cooldown: Duration,
  pub call_timeout: Duration,
  pub cache_capacity: usize,
}

impl Default for ResilienceOptions {
  fn default() -> Self {
    Self {
      max_retries: 3,
      circuit_threshold: 10,
      circuit_cooldown: Duration::from_secs(60),
      call_timeout: Duration::from_secs(30),
      cache_capacity: 4096,
    }
  }
}

/// Cache → circuit breaker → timeout → retry envelope around an upstream
/// embedder. Concurrent misses for the same text coalesce to one upstream
/// call; the cache and breaker are process-wide shared state.
pub struct ResilientEmbedder<E> {
  inner: E,
  cache: EmbeddingCache,
  breaker: CircuitBreaker,
  in_flight: DashMap<[u8; 32], Arc<tokio::sync::Mutex<()>>>,
  stats: Arc<EmbeddingStats>,
  options: ResilienceOptions,
}

impl<E: Embedder> ResilientEmbedder<E> {
  #[must_use]
  pub fn new(inner: E, options: ResilienceOptions) -> Self {
    Self {
      inner,
      cache: EmbeddingCache::new(options.cache_capacity),
      breaker: CircuitBreaker::new(options.circuit_threshold, options.circuit_cooldown),
      in_flight: DashMap::new(),
      stats: Arc::new(EmbeddingStats::default()),
      options,
    }
  }

  /// Counters for the metrics registry.
  #[must_use]
  pub fn stats(&self) -> Arc<EmbeddingStats> {
    Arc::clone(&self.stats)
  }

  async fn call_upstream(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let mut last_err = EmbedError::Unavailable;

    for attempt in 0..=self.options.max_retries {
      if attempt > 0 {
        let backoff = Duration::from_secs(1u64 << (attempt - 1));
        tracing::warn!(attempt, backoff_secs = backoff.as_secs(), "retrying embedding call");
        tokio::time::sleep(backoff).await;
      }

      match tokio::time::timeout(self.options.call_timeout, self.inner.embed(text)).await {
        Ok(Ok(vector)) => {
          self.breaker.record_success();
          return Ok(vector);
        }
        Ok(Err(err)) => {
          self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
          self.breaker.record_failure();
          if !err.is_retryable() {
            self.sync_circuit_opens();
            return Err(err);
          }
          last_err = err;
        }
        Err(_) => {
          self.stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
          self.breaker.record_failure();
          last_err = EmbedError::Timeout(self.options.call_timeout);
        }
      }
    }

    self.sync_circuit_opens();
    Err(last_err)
  }

  fn sync_circuit_opens(&self) {
    self
      .stats
      .circuit_opens
      .store(self.breaker.open_count(), Ordering::Relaxed);
  }
}

#[async_trait]
impl<E: Embedder> Embedder for ResilientEmbedder<E> {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let key = text_hash(text);

    if let Some(cached) = self.cache.get(&key) {
      self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
      return Ok(cached.as_ref().clone());
    }

    // Single-flight: identical concurrent misses wait on one gate and find
    // the first caller's result in the cache.
    let gate = self
      .in_flight
      .entry(key)
      .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
      .clone();
    let _guard = gate.lock().await;

    if let Some(cached) = self.cache.get(&key) {
      self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
      return Ok(cached.as_ref().clone());
    }
    self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

    if !self.breaker.allows_call() {
      self.in_flight.remove(&key);
      self.sync_circuit_opens();
      return Err(EmbedError::Unavailable);
    }

    let result = self.call_upstream(text).await;
    self.in_flight.remove(&key);

    let vector = result?;
    self.cache.put(key, vector.clone());
    Ok(vector)
  }
}
