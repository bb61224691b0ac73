use std::sync::Arc;

use crate::{ConsolidatedEntity, ConsolidationConfig};

/// Entities below this confidence are flagged for human review.
pub const NEEDS_REVIEW_THRESHOLD: f64 = 0.6;

/// Computes consensus confidence in [0, 1] from source count, attribute
/// agreement, and recorded contradictions. Pure in-memory.
pub struct ConsensusScorer {
  config: Arc<ConsolidationConfig>,
}

impl ConsensusScorer {
  #[must_use]
  pub fn new(config: Arc<ConsolidationConfig>) -> Self {
    Self { config }
  }

  /// Confidence for an entity given the corpus size hint (total interviews
  /// consolidated so far).
  #[must_use]
  pub fn confidence(&self, entity: &ConsolidatedEntity, total_sources_hint: u64) -> f64 {
    let divisor = self
      .config
      .source_count_divisor
      .min((total_sources_hint as f64 / 4.0).max(1.0));
    let base = (f64::from(entity.source_count) / divisor).min(1.0);

    let single_source_penalty = if entity.source_count == 1 {
      self.config.single_source_penalty
    } else {
      0.0
    };

    // Attribute-level source tracking is not modeled; attributes holding a
    // single non-empty value count as agreements. Contradicted attributes
    // still hold their kept value and are charged separately below.
    let agreements = entity
      .attributes
      .values()
      .filter(|value| !value.is_empty())
      .count();
    let agreement_bonus =
      (agreements as f64 * self.config.bonus_per_attribute).min(self.config.max_agreement_bonus);

    let contradiction_penalty =
      entity.contradiction_details.len() as f64 * self.config.penalty_per_contradiction;

    let raw = base + agreement_bonus - contradiction_penalty - single_source_penalty;
    raw.clamp(0.0, 1.0)
  }

  /// Recompute and store confidence plus the review flag.
  pub fn apply(&self, entity: &mut ConsolidatedEntity, total_sources_hint: u64) {
    let confidence = self.confidence(entity, total_sources_hint);
    entity.consensus_confidence = confidence;
    entity.needs_review = confidence < NEEDS_REVIEW_THRESHOLD;
  }
}
