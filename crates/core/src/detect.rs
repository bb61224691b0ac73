use std::cmp::Ordering;
use std::sync::Arc;

use comversa_ai::{EmbedError, Embedder, cosine_similarity, text_hash_hex};
use comversa_shared::ConsolidationError;

use crate::normalize::normalize_name;
use crate::similarity::name_similarity;
use crate::{ConsolidatedEntity, ConsolidationConfig, EntityType, ExtractedEntity};

/// Characters of description included in the embedding text.
const EMBED_DESCRIPTION_CHARS: usize = 200;

/// Text embedded for an entity: name plus the first 200 characters of its
/// description.
#[must_use]
pub fn embedding_text(name: &str, description: Option<&str>) -> String {
  match description {
    Some(description) if !description.trim().is_empty() => {
      let head: String = description.chars().take(EMBED_DESCRIPTION_CHARS).collect();
      format!("{name} {head}")
    }
    _ => name.to_owned(),
  }
}

/// One ranked duplicate candidate.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
  pub entity: ConsolidatedEntity,
  pub score: f64,
}

/// Result of a detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
  /// Candidates ordered by combined score descending.
  pub matches: Vec<DuplicateMatch>,
  /// Embedding computed for the query entity, with its text hash, when the
  /// semantic stage ran; reusable by the caller for the persisted cache.
  pub query_embedding: Option<(Vec<f32>, String)>,
  /// True when the embedding provider failed or was unavailable and the
  /// scores fell back to name-only similarity.
  pub degraded: bool,
}

/// Ranks existing entities of one type as candidate duplicates of a new
/// entity: fuzzy name prefilter first, semantic refinement only for the
/// survivors that need it.
pub struct DuplicateDetector {
  config: Arc<ConsolidationConfig>,
  embedder: Arc<dyn Embedder>,
}

struct Candidate {
  entity: ConsolidatedEntity,
  name_score: f64,
  combined: f64,
}

impl DuplicateDetector {
  #[must_use]
  pub fn new(config: Arc<ConsolidationConfig>, embedder: Arc<dyn Embedder>) -> Self {
    Self { config, embedder }
  }

  /// Rank `existing` as duplicates of `entity`. Empty input yields an empty
  /// ranking; an unavailable embedder yields name-only scores, never an
  /// error.
  pub async fn find_duplicates(
    &self,
    entity: &ExtractedEntity,
    entity_type: EntityType,
    existing: &[ConsolidatedEntity],
  ) -> Result<DetectionOutcome, ConsolidationError> {
    let query = normalize_name(&entity.name, entity_type)?;
    let threshold = self.config.threshold(entity_type);

    // Stage 1: fuzzy prefilter on normalized names.
    let mut candidates: Vec<Candidate> = existing
      .iter()
      .filter_map(|candidate| {
        let candidate_name = normalize_name(&candidate.name, entity_type).ok()?;
        let name_score = name_similarity(&query, &candidate_name);
        tracing::debug!(
          entity = %entity.name,
          candidate = %candidate.name,
          name_score,
          "fuzzy prefilter score"
        );
        (name_score >= threshold).then(|| Candidate {
          entity: candidate.clone(),
          name_score,
          combined: name_score,
        })
      })
      .collect();

    candidates.sort_by(|a, b| {
      b.name_score
        .partial_cmp(&a.name_score)
        .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(self.config.max_candidates);

    // Stage 2: semantic refinement for survivors below the skip threshold.
    let mut query_embedding: Option<(Vec<f32>, String)> = None;
    let mut degraded = false;

    for candidate in &mut candidates {
      if candidate.name_score >= self.config.skip_semantic_threshold || degraded {
        continue;
      }

      if query_embedding.is_none() {
        let text = embedding_text(&entity.name, entity.description.as_deref());
        match self.embedder.embed(&text).await {
          Ok(vector) => query_embedding = Some((vector, text_hash_hex(&text))),
          Err(err) => {
            degraded = true;
            Self::log_fallback(&err, &entity.name);
            continue;
          }
        }
      }

      let Some((query_vector, _)) = query_embedding.as_ref() else {
        continue;
      };
      match self.candidate_vector(&candidate.entity).await {
        Ok(candidate_vector) => {
          let semantic = cosine_similarity(query_vector, &candidate_vector).clamp(0.0, 1.0);
          candidate.combined = self.config.name_weight * candidate.name_score
            + self.config.semantic_weight * semantic;
          tracing::debug!(
            entity = %entity.name,
            candidate = %candidate.entity.name,
            name_score = candidate.name_score,
            semantic,
            combined = candidate.combined,
            "semantic refinement score"
          );
        }
        Err(err) => {
          degraded = true;
          Self::log_fallback(&err, &candidate.entity.name);
        }
      }
    }

    // Degraded mid-pass: every score falls back to name-only so the ranking
    // stays comparable.
    if degraded {
      for candidate in &mut candidates {
        candidate.combined = candidate.name_score;
      }
    }

    candidates.sort_by(|a, b| {
      b.combined
        .partial_cmp(&a.combined)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entity.source_count.cmp(&a.entity.source_count))
        .then_with(|| a.entity.id.cmp(&b.entity.id))
    });

    Ok(DetectionOutcome {
      matches: candidates
        .into_iter()
        .map(|candidate| DuplicateMatch {
          entity: candidate.entity,
          score: candidate.combined,
        })
        .collect(),
      query_embedding,
      degraded,
    })
  }

  /// Use the candidate's persisted vector when its text hash still matches;
  /// otherwise embed fresh.
  async fn candidate_vector(&self, candidate: &ConsolidatedEntity) -> Result<Vec<f32>, EmbedError> {
    let text = embedding_text(&candidate.name, candidate.description.as_deref());
    if let (Some(vector), Some(hash)) = (&candidate.embedding, &candidate.embedding_text_hash)
      && *hash == text_hash_hex(&text)
    {
      return Ok(vector.clone());
    }
    self.embedder.embed(&text).await
  }

  fn log_fallback(err: &EmbedError, name: &str) {
    tracing::warn!(
      entity = %name,
      error = %err,
      "embedding unavailable, falling back to name-only similarity"
    );
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use async_trait::async_trait;
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;

  /// Deterministic embedder: fixed vectors per known text, unit x-axis
  /// otherwise.
  struct StubEmbedder {
    vectors: BTreeMap<String, Vec<f32>>,
    fail: bool,
  }

  impl StubEmbedder {
    fn new() -> Self {
      Self {
        vectors: BTreeMap::new(),
        fail: false,
      }
    }

    fn failing() -> Self {
      Self {
        vectors: BTreeMap::new(),
        fail: true,
      }
    }

    fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
      self.vectors.insert(text.to_owned(), vector);
      self
    }
  }

  #[async_trait]
  impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
      if self.fail {
        return Err(EmbedError::Unavailable);
      }
      Ok(
        self
          .vectors
          .get(text)
          .cloned()
          .unwrap_or_else(|| vec![1.0, 0.0, 0.0]),
      )
    }
  }

  fn extracted(name: &str) -> ExtractedEntity {
    ExtractedEntity {
      id: None,
      name: name.to_owned(),
      description: None,
      attributes: BTreeMap::new(),
      company: None,
      business_unit: None,
      department: None,
    }
  }

  fn stored(name: &str, source_count: u32) -> ConsolidatedEntity {
    let mut entity = ConsolidatedEntity::from_extracted(
      &extracted(name),
      EntityType::System,
      Uuid::now_v7(),
      "entrevista-001",
      Utc::now(),
    );
    entity.source_count = source_count;
    entity
  }

  fn detector(embedder: StubEmbedder) -> DuplicateDetector {
    DuplicateDetector::new(
      Arc::new(ConsolidationConfig::default()),
      Arc::new(embedder),
    )
  }

  #[tokio::test]
  async fn empty_existing_set_returns_empty_ranking() {
    let detector = detector(StubEmbedder::new());
    let outcome = detector
      .find_duplicates(&extracted("Excel"), EntityType::System, &[])
      .await
      .unwrap();
    assert!(outcome.matches.is_empty());
    assert!(!outcome.degraded);
  }

  #[tokio::test]
  async fn near_identical_names_skip_the_semantic_stage() {
    // "MS Excel" vs stored "Excel" scores 1.0 on the token-set metric, at or
    // above skip_semantic_threshold, so no embedding is requested.
    let detector = detector(StubEmbedder::failing());
    let existing = [stored("Excel", 1)];
    let outcome = detector
      .find_duplicates(&extracted("MS Excel"), EntityType::System, &existing)
      .await
      .unwrap();

    assert_eq!(outcome.matches.len(), 1);
    assert!(outcome.matches[0].score >= 0.95);
    assert!(!outcome.degraded);
    assert!(outcome.query_embedding.is_none());
  }

  #[tokio::test]
  async fn below_threshold_candidates_are_filtered_out() {
    let detector = detector(StubEmbedder::new());
    let existing = [stored("SAP", 1)];
    let outcome = detector
      .find_duplicates(&extracted("SAPUI5"), EntityType::System, &existing)
      .await
      .unwrap();
    assert!(outcome.matches.is_empty());
  }

  #[tokio::test]
  async fn semantic_stage_combines_weighted_scores() {
    // A candidate that passes the fuzzy gate but stays below the skip
    // threshold (no token subset, one-character edit), forcing the semantic
    // stage.
    let query_text = "reporte de ventas";
    let candidate_text = "reportes de ventas";
    let embedder = StubEmbedder::new()
      .with(query_text, vec![1.0, 0.0])
      .with(candidate_text, vec![0.6, 0.8]);
    let detector = detector(embedder);

    let existing = [stored(candidate_text, 1)];
    let outcome = detector
      .find_duplicates(&extracted(query_text), EntityType::System, &existing)
      .await
      .unwrap();

    assert_eq!(outcome.matches.len(), 1);
    let name_score = name_similarity(query_text, candidate_text);
    assert!(name_score >= 0.75 && name_score < 0.95);
    let expected = 0.7 * name_score + 0.3 * 0.6;
    assert!((outcome.matches[0].score - expected).abs() < 1e-9);
    assert!(outcome.query_embedding.is_some());
  }

  #[tokio::test]
  async fn degraded_embedder_falls_back_to_name_only() {
    let detector = detector(StubEmbedder::failing());
    let existing = [stored("reportes de ventas", 1)];
    let outcome = detector
      .find_duplicates(&extracted("reporte de ventas"), EntityType::System, &existing)
      .await
      .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.matches.len(), 1);
    let expected = name_similarity("reporte de ventas", "reportes de ventas");
    assert!((outcome.matches[0].score - expected).abs() < 1e-9);
  }

  #[tokio::test]
  async fn ties_prefer_higher_source_count() {
    let detector = detector(StubEmbedder::failing());
    let weak = stored("Excel", 1);
    let strong = stored("Excel", 4);
    let existing = [weak, strong.clone()];

    let outcome = detector
      .find_duplicates(&extracted("Excel"), EntityType::System, &existing)
      .await
      .unwrap();

    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.matches[0].entity.id, strong.id);
  }

  #[tokio::test]
  async fn cached_candidate_vectors_bypass_the_embedder() {
    let query_text = "reporte de ventas";
    let embedder = StubEmbedder::new().with(query_text, vec![0.0, 1.0]);
    let detector = detector(embedder);

    let mut candidate = stored("reportes de ventas", 1);
    let text = embedding_text(&candidate.name, None);
    candidate.embedding = Some(vec![0.0, 1.0]);
    candidate.embedding_text_hash = Some(text_hash_hex(&text));

    let outcome = detector
      .find_duplicates(&extracted(query_text), EntityType::System, &[candidate])
      .await
      .unwrap();

    // Cosine of identical directions is 1.0, so combined is name*0.7 + 0.3.
    let name_score = name_similarity("reporte de ventas", "reportes de ventas");
    let expected = 0.7 * name_score + 0.3;
    assert!((outcome.matches[0].score - expected).abs() < 1e-9);
  }

  #[tokio::test]
  async fn unknown_type_is_rejected_before_any_lookup() {
    assert!(EntityType::parse("gadget").is_err());
  }
}
