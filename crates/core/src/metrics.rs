use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use comversa_ai::EmbeddingStats;
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::EntityType;

/// Consolidation stages with individually tracked wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Detector,
  Merger,
  Scorer,
  Discoverer,
}

#[derive(Debug, Default)]
struct StageTimers {
  detector: Duration,
  merger: Duration,
  scorer: Duration,
  discoverer: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
struct TypeCounters {
  inserted: u64,
  merged: u64,
}

/// In-memory counters and timers for the consolidation core. Process-wide
/// shared state, constructed at the entry point and passed in; exportable as
/// a flat record.
pub struct MetricsRegistry {
  duplicates_found: AtomicU64,
  entities_inserted: AtomicU64,
  entities_merged: AtomicU64,
  contradictions_recorded: AtomicU64,
  relationships_emitted: AtomicU64,
  relationships_updated: AtomicU64,
  consolidations_completed: AtomicU64,
  consolidations_failed: AtomicU64,
  confidence_sum_millis: AtomicU64,
  confidence_count: AtomicU64,
  per_type: Mutex<BTreeMap<EntityType, TypeCounters>>,
  timers: Mutex<StageTimers>,
  embedding: Arc<EmbeddingStats>,
}

impl MetricsRegistry {
  #[must_use]
  pub fn new(embedding: Arc<EmbeddingStats>) -> Self {
    Self {
      duplicates_found: AtomicU64::new(0),
      entities_inserted: AtomicU64::new(0),
      entities_merged: AtomicU64::new(0),
      contradictions_recorded: AtomicU64::new(0),
      relationships_emitted: AtomicU64::new(0),
      relationships_updated: AtomicU64::new(0),
      consolidations_completed: AtomicU64::new(0),
      consolidations_failed: AtomicU64::new(0),
      confidence_sum_millis: AtomicU64::new(0),
      confidence_count: AtomicU64::new(0),
      per_type: Mutex::new(BTreeMap::new()),
      timers: Mutex::new(StageTimers::default()),
      embedding,
    }
  }

  pub fn record_duplicates_found(&self, count: u64) {
    self.duplicates_found.fetch_add(count, Ordering::Relaxed);
  }

  pub fn record_inserted(&self, entity_type: EntityType) {
    self.entities_inserted.fetch_add(1, Ordering::Relaxed);
    self.per_type.lock().entry(entity_type).or_default().inserted += 1;
  }

  pub fn record_merged(&self, entity_type: EntityType) {
    self.entities_merged.fetch_add(1, Ordering::Relaxed);
    self.per_type.lock().entry(entity_type).or_default().merged += 1;
  }

  pub fn record_contradictions(&self, count: u64) {
    self.contradictions_recorded.fetch_add(count, Ordering::Relaxed);
  }

  pub fn record_relationship_emitted(&self) {
    self.relationships_emitted.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_relationship_updated(&self) {
    self.relationships_updated.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_consolidation_completed(&self) {
    self.consolidations_completed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_consolidation_failed(&self) {
    self.consolidations_failed.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_confidence(&self, confidence: f64) {
    let millis = (confidence.clamp(0.0, 1.0) * 1000.0).round() as u64;
    self.confidence_sum_millis.fetch_add(millis, Ordering::Relaxed);
    self.confidence_count.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_stage(&self, stage: Stage, elapsed: Duration) {
    let mut timers = self.timers.lock();
    match stage {
      Stage::Detector => timers.detector += elapsed,
      Stage::Merger => timers.merger += elapsed,
      Stage::Scorer => timers.scorer += elapsed,
      Stage::Discoverer => timers.discoverer += elapsed,
    }
  }

  /// Flat, serialization-ready view of every counter, timer, and aggregate.
  #[must_use]
  pub fn snapshot(&self) -> MetricsSnapshot {
    let inserted = self.entities_inserted.load(Ordering::Relaxed);
    let merged = self.entities_merged.load(Ordering::Relaxed);
    let contradictions = self.contradictions_recorded.load(Ordering::Relaxed);
    let confidence_count = self.confidence_count.load(Ordering::Relaxed);
    let confidence_sum = self.confidence_sum_millis.load(Ordering::Relaxed) as f64 / 1000.0;

    let (inserted_by_type, merged_by_type) = {
      let per_type = self.per_type.lock();
      (
        per_type
          .iter()
          .map(|(ty, counters)| (ty.to_string(), counters.inserted))
          .collect(),
        per_type
          .iter()
          .map(|(ty, counters)| (ty.to_string(), counters.merged))
          .collect(),
      )
    };

    let timers = self.timers.lock();
    let embedding = self.embedding.snapshot();

    MetricsSnapshot {
      duplicates_found: self.duplicates_found.load(Ordering::Relaxed),
      entities_inserted: inserted,
      entities_merged: merged,
      contradictions_recorded: contradictions,
      relationships_emitted: self.relationships_emitted.load(Ordering::Relaxed),
      relationships_updated: self.relationships_updated.load(Ordering::Relaxed),
      consolidations_completed: self.consolidations_completed.load(Ordering::Relaxed),
      consolidations_failed: self.consolidations_failed.load(Ordering::Relaxed),
      embedding_cache_hits: embedding.embedding_cache_hits,
      embedding_cache_misses: embedding.embedding_cache_misses,
      embedding_upstream_failures: embedding.embedding_upstream_failures,
      embedding_circuit_opens: embedding.embedding_circuit_opens,
      detector_seconds: timers.detector.as_secs_f64(),
      merger_seconds: timers.merger.as_secs_f64(),
      scorer_seconds: timers.scorer.as_secs_f64(),
      discoverer_seconds: timers.discoverer.as_secs_f64(),
      average_confidence: if confidence_count == 0 {
        0.0
      } else {
        confidence_sum / confidence_count as f64
      },
      duplicate_reduction_ratio: if inserted + merged == 0 {
        0.0
      } else {
        merged as f64 / (inserted + merged) as f64
      },
      contradiction_rate: if merged == 0 {
        0.0
      } else {
        contradictions as f64 / merged as f64
      },
      inserted_by_type,
      merged_by_type,
    }
  }
}

/// Flat export of the registry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSnapshot {
  pub duplicates_found: u64,
  pub entities_inserted: u64,
  pub entities_merged: u64,
  pub contradictions_recorded: u64,
  pub relationships_emitted: u64,
  pub relationships_updated: u64,
  pub consolidations_completed: u64,
  pub consolidations_failed: u64,
  pub embedding_cache_hits: u64,
  pub embedding_cache_misses: u64,
  pub embedding_upstream_failures: u64,
  pub embedding_circuit_opens: u64,
  pub detector_seconds: f64,
  pub merger_seconds: f64,
  pub scorer_seconds: f64,
  pub discoverer_seconds: f64,
  pub average_confidence: f64,
  pub duplicate_reduction_ratio: f64,
  pub contradiction_rate: f64,
  pub inserted_by_type: BTreeMap<String, u64>,
  pub merged_by_type: BTreeMap<String, u64>,
}
