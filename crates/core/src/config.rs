use std::collections::BTreeMap;
use std::time::Duration;

use comversa_ai::ResilienceOptions;
use serde::{Deserialize, Serialize};

use crate::EntityType;

/// Fallback duplicate threshold for types without an explicit entry.
const DEFAULT_THRESHOLD: f64 = 0.75;

/// Every knob of the consolidation core, received as a value object.
/// Configuration file loading is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
  /// Per-type duplicate cutoff `T(type)`; `threshold()` falls back to 0.75.
  pub type_thresholds: BTreeMap<EntityType, f64>,
  pub name_weight: f64,
  pub semantic_weight: f64,
  pub skip_semantic_threshold: f64,
  pub max_candidates: usize,
  pub source_count_divisor: f64,
  pub single_source_penalty: f64,
  pub bonus_per_attribute: f64,
  pub max_agreement_bonus: f64,
  pub penalty_per_contradiction: f64,
  pub recurring_pain_threshold: u32,
  pub problematic_system_threshold: u32,
  pub high_priority_frequency: f64,
  pub max_retries: u32,
  pub circuit_threshold: u32,
  pub embedding_timeout_seconds: u64,
  pub contradiction_similarity_threshold: f64,
  pub consolidation_timeout_seconds: u64,
}

impl Default for ConsolidationConfig {
  fn default() -> Self {
    use EntityType::*;

    let type_thresholds = BTreeMap::from([
      (PainPoint, 0.70),
      (Inefficiency, 0.70),
      (FailureMode, 0.70),
      (System, 0.75),
      (Process, 0.75),
      (AutomationCandidate, 0.75),
      (DataFlow, 0.80),
      (BudgetConstraint, 0.80),
      (Kpi, 0.85),
      (CommunicationChannel, 0.85),
      (TemporalPattern, 0.85),
      (ExternalDependency, 0.85),
      (TeamStructure, 0.90),
    ]);

    Self {
      type_thresholds,
      name_weight: 0.7,
      semantic_weight: 0.3,
      skip_semantic_threshold: 0.95,
      max_candidates: 10,
      source_count_divisor: 5.0,
      single_source_penalty: 0.3,
      bonus_per_attribute: 0.05,
      max_agreement_bonus: 0.3,
      penalty_per_contradiction: 0.25,
      recurring_pain_threshold: 3,
      problematic_system_threshold: 5,
      high_priority_frequency: 0.30,
      max_retries: 3,
      circuit_threshold: 10,
      embedding_timeout_seconds: 30,
      contradiction_similarity_threshold: 0.7,
      consolidation_timeout_seconds: 300,
    }
  }
}

impl ConsolidationConfig {
  /// Duplicate cutoff for a type.
  #[must_use]
  pub fn threshold(&self, entity_type: EntityType) -> f64 {
    self
      .type_thresholds
      .get(&entity_type)
      .copied()
      .unwrap_or(DEFAULT_THRESHOLD)
  }

  /// Envelope options for the embedding provider derived from this config.
  #[must_use]
  pub fn resilience_options(&self) -> ResilienceOptions {
    ResilienceOptions {
      max_retries: self.max_retries,
      circuit_threshold: self.circuit_threshold,
      call_timeout: Duration::from_secs(self.embedding_timeout_seconds),
      ..ResilienceOptions::default()
    }
  }
}
