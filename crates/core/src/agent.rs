use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use comversa_shared::{ConsolidationError, StoreError};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::{EntityStore, StoreTransaction};
use crate::{
  AuditRecord, ConsensusScorer, ConsolidatedEntity, ConsolidationConfig, DuplicateDetector,
  EntityMerger, EntitySnapshot, EntityType, ExtractedEntity, MetricsRegistry, Relationship,
  RelationshipDiscoverer, Stage, normalize_name,
};

/// One interview's worth of freshly extracted entities.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsolidationInput {
  pub interview_id: String,
  pub entities_by_type: BTreeMap<EntityType, Vec<ExtractedEntity>>,
}

/// Resulting entity ids (inserted and updated) per type, plus a metrics
/// snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConsolidationOutcome {
  pub interview_id: String,
  pub entity_ids_by_type: BTreeMap<EntityType, Vec<Uuid>>,
  pub metrics: crate::MetricsSnapshot,
}

/// Orchestrates detector → merger → scorer → discoverer for one interview,
/// atomically: either every merge and insert commits, or none do.
pub struct ConsolidationAgent {
  store: Arc<dyn EntityStore>,
  detector: DuplicateDetector,
  merger: EntityMerger,
  scorer: ConsensusScorer,
  discoverer: RelationshipDiscoverer,
  metrics: Arc<MetricsRegistry>,
  config: Arc<ConsolidationConfig>,
}

impl ConsolidationAgent {
  #[must_use]
  pub fn new(
    store: Arc<dyn EntityStore>,
    detector: DuplicateDetector,
    config: Arc<ConsolidationConfig>,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      store,
      detector,
      merger: EntityMerger::new(Arc::clone(&config)),
      scorer: ConsensusScorer::new(Arc::clone(&config)),
      discoverer: RelationshipDiscoverer,
      metrics,
      config,
    }
  }

  /// Consolidate one interview. Transient store errors are retried with
  /// backoff; every other failure rolls the transaction back and surfaces as
  /// `ConsolidationFailed` carrying a correlation id. An unavailable
  /// embedding provider is recovered internally and never aborts the call.
  pub async fn consolidate(
    &self,
    input: &ConsolidationInput,
  ) -> Result<ConsolidationOutcome, ConsolidationError> {
    let correlation_id = Uuid::now_v7();
    let span = tracing::info_span!(
      "consolidate",
      interview_id = %input.interview_id,
      %correlation_id,
    );

    // Preflight: reject invalid names before touching the store, leaving
    // the batch untouched.
    for (entity_type, entities) in &input.entities_by_type {
      for entity in entities {
        normalize_name(&entity.name, *entity_type)?;
      }
    }

    let budget = Duration::from_secs(self.config.consolidation_timeout_seconds);
    let attempt_loop = self.consolidate_with_retries(input, correlation_id);

    match tokio::time::timeout(budget, attempt_loop.instrument(span)).await {
      Ok(Ok(outcome)) => {
        self.metrics.record_consolidation_completed();
        Ok(outcome)
      }
      Ok(Err(err)) => {
        self.metrics.record_consolidation_failed();
        Err(err)
      }
      Err(_) => {
        self.metrics.record_consolidation_failed();
        tracing::error!(
          interview_id = %input.interview_id,
          %correlation_id,
          timeout_seconds = budget.as_secs(),
          "consolidation timed out"
        );
        Err(ConsolidationError::failed(
          correlation_id,
          ConsolidationError::Timeout(budget.as_secs()),
        ))
      }
    }
  }

  async fn consolidate_with_retries(
    &self,
    input: &ConsolidationInput,
    correlation_id: Uuid,
  ) -> Result<ConsolidationOutcome, ConsolidationError> {
    let mut attempt: u32 = 0;
    loop {
      match self.consolidate_once(input, correlation_id).await {
        Ok(outcome) => return Ok(outcome),
        Err(ConsolidationError::Store(err))
          if err.is_transient() && attempt < self.config.max_retries =>
        {
          let backoff = Duration::from_secs(1u64 << attempt);
          attempt += 1;
          tracing::warn!(
            interview_id = %input.interview_id,
            %correlation_id,
            attempt,
            backoff_secs = backoff.as_secs(),
            error = %err,
            "transient store error, retrying consolidation"
          );
          tokio::time::sleep(backoff).await;
        }
        Err(err) => return Err(ConsolidationError::failed(correlation_id, err)),
      }
    }
  }

  async fn consolidate_once(
    &self,
    input: &ConsolidationInput,
    correlation_id: Uuid,
  ) -> Result<ConsolidationOutcome, ConsolidationError> {
    let now = Utc::now();
    let mut txn = self.store.begin().await?;

    let result = self.run_in_txn(txn.as_mut(), input, now).await;

    match result {
      Ok(outcome) => {
        txn.commit().await?;
        tracing::info!(
          interview_id = %input.interview_id,
          entities = outcome.entity_ids_by_type.values().map(Vec::len).sum::<usize>(),
          "consolidation committed"
        );
        Ok(outcome)
      }
      Err(err) => {
        tracing::error!(
          interview_id = %input.interview_id,
          %correlation_id,
          error = %err,
          "consolidation rolled back"
        );
        if let Err(rollback_err) = txn.rollback().await {
          tracing::warn!(error = %rollback_err, "transaction rollback also failed");
        }
        Err(err)
      }
    }
  }

  async fn run_in_txn(
    &self,
    txn: &mut dyn StoreTransaction,
    input: &ConsolidationInput,
    now: DateTime<Utc>,
  ) -> Result<ConsolidationOutcome, ConsolidationError> {
    txn.upsert_interview(&input.interview_id, now).await?;
    let total_interviews = txn.get_total_interview_count().await?;

    let mut entity_ids_by_type: BTreeMap<EntityType, Vec<Uuid>> = BTreeMap::new();
    let mut consolidated_by_type: BTreeMap<EntityType, Vec<ConsolidatedEntity>> = BTreeMap::new();

    for entity_type in EntityType::CONSOLIDATION_ORDER {
      let Some(new_entities) = input.entities_by_type.get(&entity_type) else {
        continue;
      };
      let mut existing = txn.get_entities_by_type(entity_type, None).await?;

      for extracted in new_entities {
        let written = self
          .consolidate_entity(
            txn,
            extracted,
            entity_type,
            &mut existing,
            &input.interview_id,
            total_interviews,
            now,
          )
          .await?;

        entity_ids_by_type
          .entry(entity_type)
          .or_default()
          .push(written.id);
        consolidated_by_type
          .entry(entity_type)
          .or_default()
          .push(written);
      }
    }

    let discovery_started = Instant::now();
    let edges = self
      .discoverer
      .discover(&consolidated_by_type, &input.interview_id);
    self
      .metrics
      .record_stage(Stage::Discoverer, discovery_started.elapsed());

    for edge in edges {
      self
        .apply_edge(txn, &edge, &input.interview_id, now)
        .await?;
    }

    Ok(ConsolidationOutcome {
      interview_id: input.interview_id.clone(),
      entity_ids_by_type,
      metrics: self.metrics.snapshot(),
    })
  }

  #[allow(clippy::too_many_arguments)]
  async fn consolidate_entity(
    &self,
    txn: &mut dyn StoreTransaction,
    extracted: &ExtractedEntity,
    entity_type: EntityType,
    existing: &mut Vec<ConsolidatedEntity>,
    interview_id: &str,
    total_interviews: u64,
    now: DateTime<Utc>,
  ) -> Result<ConsolidatedEntity, ConsolidationError> {
    let detect_started = Instant::now();
    let detection = self
      .detector
      .find_duplicates(extracted, entity_type, existing)
      .await?;
    self
      .metrics
      .record_stage(Stage::Detector, detect_started.elapsed());
    self
      .metrics
      .record_duplicates_found(detection.matches.len() as u64);

    let new_id = extracted.id.unwrap_or_else(Uuid::now_v7);
    let threshold = self.config.threshold(entity_type);

    let top = detection
      .matches
      .first()
      .filter(|candidate| candidate.score >= threshold);

    let Some(top) = top else {
      // No duplicate: insert as a standalone entity.
      let mut fresh =
        ConsolidatedEntity::from_extracted(extracted, entity_type, new_id, interview_id, now);
      let score_started = Instant::now();
      self.scorer.apply(&mut fresh, total_interviews);
      self
        .metrics
        .record_stage(Stage::Scorer, score_started.elapsed());

      txn.insert_entity(entity_type, &fresh).await?;
      if let Some((vector, hash)) = &detection.query_embedding {
        txn
          .put_entity_embedding(entity_type, fresh.id, vector, hash)
          .await?;
        fresh.embedding = Some(vector.clone());
        fresh.embedding_text_hash = Some(hash.clone());
      }

      self.metrics.record_inserted(entity_type);
      self.metrics.record_confidence(fresh.consensus_confidence);
      tracing::info!(
        entity_type = %entity_type,
        name = %extracted.name,
        confidence = fresh.consensus_confidence,
        "inserted new entity"
      );

      existing.push(fresh.clone());
      return Ok(fresh);
    };

    // Duplicate found: merge into the top candidate.
    let merge_started = Instant::now();
    let mut merged = self.merger.merge(
      extracted,
      &top.entity,
      new_id,
      interview_id,
      top.score,
      now,
    );
    self
      .metrics
      .record_stage(Stage::Merger, merge_started.elapsed());

    if is_noop_merge(&top.entity, &merged, interview_id) {
      tracing::info!(
        entity_type = %entity_type,
        name = %extracted.name,
        "interview already consolidated into this entity, skipping"
      );
      return Ok(top.entity.clone());
    }

    let score_started = Instant::now();
    self.scorer.apply(&mut merged, total_interviews);
    self
      .metrics
      .record_stage(Stage::Scorer, score_started.elapsed());

    let audit_id = Uuid::now_v7();
    txn
      .insert_snapshot(&snapshot_of(&top.entity, audit_id, now)?)
      .await?;

    // The incoming entity's standalone state goes into the same audit, so a
    // rollback can restore it next to the pre-merge candidate. A stored
    // standalone row with this id (restored by an earlier rollback) is
    // absorbed by the merge.
    let standalone = match txn.get_entity(entity_type, new_id).await? {
      Some(stored_row) => {
        txn.remove_absorbed_entity(entity_type, new_id).await?;
        stored_row
      }
      None => {
        let mut standalone =
          ConsolidatedEntity::from_extracted(extracted, entity_type, new_id, interview_id, now);
        self.scorer.apply(&mut standalone, total_interviews);
        standalone
      }
    };
    txn
      .insert_snapshot(&snapshot_of(&standalone, audit_id, now)?)
      .await?;

    txn
      .update_consolidated_entity(entity_type, merged.id, &merged, interview_id)
      .await?;
    txn
      .insert_audit(&AuditRecord {
        id: audit_id,
        entity_type,
        merged_entity_ids: vec![new_id],
        resulting_entity_id: merged.id,
        similarity_score: top.score,
        consolidated_at: now,
        rolled_back_at: None,
        rollback_reason: None,
      })
      .await?;

    let new_contradictions =
      merged.contradiction_details.len() - top.entity.contradiction_details.len();
    self.metrics.record_merged(entity_type);
    self
      .metrics
      .record_contradictions(new_contradictions as u64);
    self.metrics.record_confidence(merged.consensus_confidence);
    tracing::info!(
      entity_type = %entity_type,
      name = %extracted.name,
      into = %merged.name,
      score = top.score,
      contradictions = new_contradictions,
      "merged into existing entity"
    );

    if let Some(slot) = existing.iter_mut().find(|entity| entity.id == merged.id) {
      *slot = merged.clone();
    }
    Ok(merged)
  }

  async fn apply_edge(
    &self,
    txn: &mut dyn StoreTransaction,
    edge: &crate::DiscoveredEdge,
    interview_id: &str,
    now: DateTime<Utc>,
  ) -> Result<(), ConsolidationError> {
    match txn
      .find_relationship(
        edge.source_entity_id,
        edge.target_entity_id,
        edge.relationship_type,
      )
      .await?
    {
      Some(mut relationship) => {
        if relationship
          .mentioned_in_interviews
          .iter()
          .any(|id| id == interview_id)
        {
          return Ok(());
        }
        relationship
          .mentioned_in_interviews
          .push(interview_id.to_owned());
        relationship.strength = (relationship.strength + 0.2).min(1.0);
        relationship.updated_at = now;
        txn.update_relationship(&relationship).await?;
        self.metrics.record_relationship_updated();
      }
      None => {
        let relationship = Relationship {
          id: Uuid::now_v7(),
          source_entity_id: edge.source_entity_id,
          source_entity_type: edge.source_entity_type,
          target_entity_id: edge.target_entity_id,
          target_entity_type: edge.target_entity_type,
          relationship_type: edge.relationship_type,
          strength: edge.strength,
          mentioned_in_interviews: vec![interview_id.to_owned()],
          created_at: now,
          updated_at: now,
        };
        txn.insert_relationship(&relationship).await?;
        self.metrics.record_relationship_emitted();
      }
    }
    Ok(())
  }
}

/// Re-ingesting an interview that changed nothing writes nothing: no update,
/// no snapshot, no audit record.
fn is_noop_merge(
  existing: &ConsolidatedEntity,
  merged: &ConsolidatedEntity,
  interview_id: &str,
) -> bool {
  existing
    .mentioned_in_interviews
    .iter()
    .any(|id| id == interview_id)
    && existing.mentioned_in_interviews == merged.mentioned_in_interviews
    && existing.name == merged.name
    && existing.description == merged.description
    && existing.attributes == merged.attributes
    && existing.contradiction_details == merged.contradiction_details
    && existing.company == merged.company
    && existing.business_unit == merged.business_unit
    && existing.department == merged.department
}

fn snapshot_of(
  entity: &ConsolidatedEntity,
  audit_id: Uuid,
  now: DateTime<Utc>,
) -> Result<EntitySnapshot, StoreError> {
  let state = serde_json::to_value(entity)
    .map_err(|err| StoreError::Fatal(format!("snapshot serialization failed: {err}")))?;
  Ok(EntitySnapshot {
    id: Uuid::now_v7(),
    audit_id,
    entity_type: entity.entity_type,
    entity_id: entity.id,
    entity_state: state,
    created_at: now,
  })
}
