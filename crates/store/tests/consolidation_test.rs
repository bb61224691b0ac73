//! End-to-end consolidation scenarios over the in-memory store adapter with
//! a deterministic embedder: duplicate folding, contradiction tracking,
//! relationship discovery, pattern scans, rollback, and the atomicity /
//! idempotence laws.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use comversa_ai::{EmbedError, Embedder, EmbeddingStats};
use comversa_core::{
  AttributeValue, ConsolidationAgent, ConsolidationConfig, ConsolidationError, ConsolidationInput,
  DuplicateDetector, EntityStore, EntityType, ExtractedEntity, MetricsRegistry, PatternRecognizer,
  PatternType, RelationshipType, RollbackService, StoreError, name_similarity,
};
use comversa_store::MemEntityStore;
use uuid::Uuid;

// ──────────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────────

/// Deterministic embedder: a folded byte histogram, L2-normalized.
struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let mut vector = [0.0_f32; 8];
    for (i, byte) in text.bytes().enumerate() {
      vector[i % 8] += f32::from(byte);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    Ok(vector.iter().map(|x| x / norm).collect())
  }
}

/// Embedder that never answers; used to exercise the consolidation timeout.
struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Err(EmbedError::Unavailable)
  }
}

struct Harness {
  store: MemEntityStore,
  agent: ConsolidationAgent,
  rollback: RollbackService,
  recognizer: PatternRecognizer,
  metrics: Arc<MetricsRegistry>,
}

fn harness() -> Harness {
  harness_with(ConsolidationConfig::default(), Arc::new(StubEmbedder))
}

fn harness_with(config: ConsolidationConfig, embedder: Arc<dyn Embedder>) -> Harness {
  let config = Arc::new(config);
  let store = MemEntityStore::new();
  let store_arc: Arc<dyn EntityStore> = Arc::new(store.clone());
  let metrics = Arc::new(MetricsRegistry::new(Arc::new(EmbeddingStats::default())));
  let detector = DuplicateDetector::new(Arc::clone(&config), embedder);
  let agent = ConsolidationAgent::new(
    Arc::clone(&store_arc),
    detector,
    Arc::clone(&config),
    Arc::clone(&metrics),
  );
  let rollback = RollbackService::new(Arc::clone(&store_arc));
  let recognizer = PatternRecognizer::new(config);
  Harness {
    store,
    agent,
    rollback,
    recognizer,
    metrics,
  }
}

fn entity(name: &str) -> ExtractedEntity {
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

fn entity_with(
  name: &str,
  id: Option<Uuid>,
  description: Option<&str>,
  attributes: &[(&str, AttributeValue)],
) -> ExtractedEntity {
  ExtractedEntity {
    id,
    name: name.to_owned(),
    description: description.map(str::to_owned),
    attributes: attributes
      .iter()
      .map(|(key, value)| ((*key).to_owned(), value.clone()))
      .collect(),
    company: None,
    business_unit: None,
    department: None,
  }
}

fn input(interview_id: &str, entities: Vec<(EntityType, ExtractedEntity)>) -> ConsolidationInput {
  let mut entities_by_type: BTreeMap<EntityType, Vec<ExtractedEntity>> = BTreeMap::new();
  for (entity_type, entity) in entities {
    entities_by_type.entry(entity_type).or_default().push(entity);
  }
  ConsolidationInput {
    interview_id: interview_id.to_owned(),
    entities_by_type,
  }
}

/// The entity invariants, checked over every stored entity.
async fn assert_entity_invariants(store: &MemEntityStore) {
  for entity_type in EntityType::CONSOLIDATION_ORDER {
    let entities = store.get_entities_by_type(entity_type, None).await.unwrap();
    for entity in entities {
      let distinct: std::collections::BTreeSet<&String> =
        entity.mentioned_in_interviews.iter().collect();
      assert_eq!(
        entity.source_count as usize,
        distinct.len(),
        "source_count law broken for {}",
        entity.name
      );
      assert!(
        (0.0..=1.0).contains(&entity.consensus_confidence),
        "confidence out of bounds for {}",
        entity.name
      );
      assert_eq!(
        entity.needs_review,
        entity.consensus_confidence < 0.6,
        "review flag law broken for {}",
        entity.name
      );
      assert_eq!(
        entity.has_contradictions,
        !entity.contradiction_details.is_empty(),
        "contradiction flag law broken for {}",
        entity.name
      );
    }
  }
}

// ──────────────────────────────────────────────────
// Duplicate folding
// ──────────────────────────────────────────────────

#[tokio::test]
async fn three_spellings_fold_into_one_system() {
  let h = harness();

  for (interview, name) in [("1", "Excel"), ("2", "MS Excel"), ("3", "Microsoft Excel")] {
    h.agent
      .consolidate(&input(interview, vec![(EntityType::System, entity(name))]))
      .await
      .unwrap();
  }

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 1);

  let system = &systems[0];
  assert_eq!(system.name, "Excel");
  assert_eq!(system.source_count, 3);
  assert_eq!(system.mentioned_in_interviews, vec!["1", "2", "3"]);
  assert!(system.is_consolidated);
  assert_eq!(system.merged_entity_ids.len(), 2);

  assert_entity_invariants(&h.store).await;

  let metrics = h.metrics.snapshot();
  assert_eq!(metrics.entities_inserted, 1);
  assert_eq!(metrics.entities_merged, 2);
}

// ──────────────────────────────────────────────────
// Near misses below threshold
// ──────────────────────────────────────────────────

#[tokio::test]
async fn sap_and_sapui5_stay_distinct() {
  let h = harness();

  h.agent
    .consolidate(&input("1", vec![(EntityType::System, entity("SAP"))]))
    .await
    .unwrap();
  h.agent
    .consolidate(&input("2", vec![(EntityType::System, entity("SAPUI5"))]))
    .await
    .unwrap();

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 2);
  assert_entity_invariants(&h.store).await;
}

// ──────────────────────────────────────────────────
// Contradiction tracking
// ──────────────────────────────────────────────────

#[tokio::test]
async fn conflicting_frequency_is_recorded_and_penalized() {
  // Register eight empty interviews first so the confidence formula is in
  // its clamp-free region and the penalty is observable exactly.
  let conflicted = harness();
  let control = harness();
  for h in [&conflicted, &control] {
    for i in 0..8 {
      h.agent
        .consolidate(&input(&format!("warmup-{i}"), vec![]))
        .await
        .unwrap();
    }
  }

  let pain = |frequency: &str| {
    entity_with(
      "reportes lentos",
      None,
      None,
      &[("frequency", AttributeValue::Text(frequency.into()))],
    )
  };

  for (h, second_value) in [(&conflicted, "weekly"), (&control, "daily")] {
    h.agent
      .consolidate(&input("1", vec![(EntityType::PainPoint, pain("daily"))]))
      .await
      .unwrap();
    h.agent
      .consolidate(&input("2", vec![(EntityType::PainPoint, pain(second_value))]))
      .await
      .unwrap();
  }

  let pains = conflicted
    .store
    .get_entities_by_type(EntityType::PainPoint, None)
    .await
    .unwrap();
  assert_eq!(pains.len(), 1);
  let pain = &pains[0];

  assert!(pain.has_contradictions);
  assert_eq!(pain.contradiction_details.len(), 1);
  let contradiction = &pain.contradiction_details[0];
  assert_eq!(contradiction.attribute, "frequency");
  assert_eq!(
    contradiction.values,
    vec![
      AttributeValue::Text("daily".into()),
      AttributeValue::Text("weekly".into())
    ]
  );
  assert_eq!(contradiction.source_interviews, vec!["1", "2"]);
  assert_eq!(
    pain.attributes["frequency"],
    AttributeValue::Text("daily".into())
  );

  let control_pain = &control
    .store
    .get_entities_by_type(EntityType::PainPoint, None)
    .await
    .unwrap()[0];
  let drop = control_pain.consensus_confidence - pain.consensus_confidence;
  assert!(
    (drop - 0.25).abs() < 1e-9,
    "contradiction should cost exactly the configured penalty, got {drop}"
  );

  assert_entity_invariants(&conflicted.store).await;
}

// ──────────────────────────────────────────────────
// Relationship discovery
// ──────────────────────────────────────────────────

#[tokio::test]
async fn system_mention_emits_causes_edge() {
  let h = harness();

  h.agent
    .consolidate(&input(
      "entrevista-007",
      vec![
        (EntityType::System, entity("Excel")),
        (
          EntityType::PainPoint,
          entity_with(
            "reportes manuales",
            None,
            Some("los reportes en Excel son muy lentos"),
            &[],
          ),
        ),
      ],
    ))
    .await
    .unwrap();

  let relationships = h.store.get_relationships().await.unwrap();
  assert_eq!(relationships.len(), 1);
  let edge = &relationships[0];
  assert_eq!(edge.relationship_type, RelationshipType::Causes);
  assert_eq!(edge.source_entity_type, EntityType::System);
  assert_eq!(edge.target_entity_type, EntityType::PainPoint);
  assert_eq!(edge.strength, 0.8);
  assert_eq!(edge.mentioned_in_interviews, vec!["entrevista-007"]);

  // No orphans: both endpoints were persisted in the same transaction.
  assert!(h.store.find_orphan_relationships().await.unwrap().is_empty());
}

#[tokio::test]
async fn rediscovered_edges_grow_monotonically() {
  let h = harness();
  let co_occurrence = |interview: &str| {
    input(
      interview,
      vec![
        (EntityType::System, entity("Excel")),
        (
          EntityType::PainPoint,
          entity_with(
            "reportes manuales",
            None,
            Some("los reportes en Excel son muy lentos"),
            &[],
          ),
        ),
      ],
    )
  };

  h.agent.consolidate(&co_occurrence("1")).await.unwrap();
  h.agent.consolidate(&co_occurrence("2")).await.unwrap();

  let relationships = h.store.get_relationships().await.unwrap();
  assert_eq!(relationships.len(), 1);
  let edge = &relationships[0];
  assert_eq!(edge.mentioned_in_interviews, vec!["1", "2"]);
  assert!((edge.strength - 1.0).abs() < 1e-9);

  // Re-running interview 2 neither weakens the edge nor drops interviews.
  h.agent.consolidate(&co_occurrence("2")).await.unwrap();
  let edge = &h.store.get_relationships().await.unwrap()[0];
  assert_eq!(edge.mentioned_in_interviews, vec!["1", "2"]);
  assert!((edge.strength - 1.0).abs() < 1e-9);
}

// ──────────────────────────────────────────────────
// Pattern recognition
// ──────────────────────────────────────────────────

#[tokio::test]
async fn pain_in_four_of_ten_interviews_is_high_priority() {
  let h = harness();

  for i in 1..=10 {
    let interview = i.to_string();
    let entities = if i <= 4 {
      vec![(
        EntityType::PainPoint,
        entity("coordinación por WhatsApp"),
      )]
    } else {
      vec![]
    };
    h.agent.consolidate(&input(&interview, entities)).await.unwrap();
  }

  let patterns = h.recognizer.scan_and_store(&h.store).await.unwrap();
  let recurring: Vec<_> = patterns
    .iter()
    .filter(|p| p.pattern_type == PatternType::RecurringPain)
    .collect();
  assert_eq!(recurring.len(), 1);
  let pattern = recurring[0];
  assert_eq!(pattern.source_count, 4);
  assert!((pattern.pattern_frequency - 0.4).abs() < 1e-9);
  assert!(pattern.high_priority);

  // Stored rows match and replace wholesale on the next scan.
  let stored = h
    .store
    .get_patterns(Some(PatternType::RecurringPain))
    .await
    .unwrap();
  assert_eq!(stored.len(), 1);

  h.recognizer.scan_and_store(&h.store).await.unwrap();
  let stored = h
    .store
    .get_patterns(Some(PatternType::RecurringPain))
    .await
    .unwrap();
  assert_eq!(stored.len(), 1);
}

// ──────────────────────────────────────────────────
// Rollback
// ──────────────────────────────────────────────────

#[tokio::test]
async fn rollback_restores_both_entities() {
  let h = harness();
  let third_id = Uuid::now_v7();

  h.agent
    .consolidate(&input("1", vec![(EntityType::System, entity("Excel"))]))
    .await
    .unwrap();
  h.agent
    .consolidate(&input("2", vec![(EntityType::System, entity("MS Excel"))]))
    .await
    .unwrap();
  h.agent
    .consolidate(&input(
      "3",
      vec![(
        EntityType::System,
        entity_with("Microsoft Excel", Some(third_id), None, &[]),
      )],
    ))
    .await
    .unwrap();

  let audits = h.store.list_audits(Some(EntityType::System)).await.unwrap();
  assert_eq!(audits.len(), 2);
  let third_merge = audits.last().unwrap().clone();
  assert_eq!(third_merge.merged_entity_ids, vec![third_id]);

  h.rollback.rollback(third_merge.id, "test").await.unwrap();

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 2);

  let consolidated = systems.iter().find(|s| s.name == "Excel").unwrap();
  assert_eq!(consolidated.source_count, 2);
  assert_eq!(consolidated.mentioned_in_interviews, vec!["1", "2"]);

  let restored = systems.iter().find(|s| s.name == "Microsoft Excel").unwrap();
  assert_eq!(restored.id, third_id);
  assert_eq!(restored.source_count, 1);
  assert_eq!(restored.mentioned_in_interviews, vec!["3"]);
  assert!(!restored.is_consolidated);

  let audit = h.store.get_audit(third_merge.id).await.unwrap().unwrap();
  assert!(audit.rolled_back_at.is_some());
  assert_eq!(audit.rollback_reason.as_deref(), Some("test"));

  // A second rollback of the same audit is refused.
  let err = h.rollback.rollback(third_merge.id, "again").await.unwrap_err();
  assert!(matches!(
    err,
    ConsolidationError::AlreadyRolledBack(id) if id == third_merge.id
  ));

  assert_entity_invariants(&h.store).await;
}

#[tokio::test]
async fn rollback_round_trip_converges_on_rerun() {
  let h = harness();
  let third_id = Uuid::now_v7();
  let third_input = input(
    "3",
    vec![(
      EntityType::System,
      entity_with("Microsoft Excel", Some(third_id), None, &[]),
    )],
  );

  h.agent
    .consolidate(&input("1", vec![(EntityType::System, entity("Excel"))]))
    .await
    .unwrap();
  h.agent
    .consolidate(&input("2", vec![(EntityType::System, entity("MS Excel"))]))
    .await
    .unwrap();
  h.agent.consolidate(&third_input).await.unwrap();

  let audits = h.store.list_audits(Some(EntityType::System)).await.unwrap();
  let third_merge = audits.last().unwrap().clone();
  h.rollback.rollback(third_merge.id, "prueba").await.unwrap();

  // Re-running the same consolidation re-absorbs the restored standalone.
  h.agent.consolidate(&third_input).await.unwrap();

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 1);
  let system = &systems[0];
  assert_eq!(system.name, "Excel");
  assert_eq!(system.source_count, 3);
  assert_eq!(system.mentioned_in_interviews, vec!["1", "2", "3"]);
  assert_eq!(system.merged_entity_ids.len(), 2);
  assert!(system.merged_entity_ids.contains(&third_id));
}

// ──────────────────────────────────────────────────
// Laws: idempotence, atomicity, retries, timeout
// ──────────────────────────────────────────────────

#[tokio::test]
async fn reingesting_the_same_interview_changes_nothing() {
  let h = harness();
  let call = input(
    "1",
    vec![
      (EntityType::System, entity("Excel")),
      (
        EntityType::PainPoint,
        entity_with(
          "reportes manuales",
          None,
          Some("los reportes en Excel son muy lentos"),
          &[],
        ),
      ),
    ],
  );

  h.agent.consolidate(&call).await.unwrap();
  let audits_before = h.store.list_audits(None).await.unwrap().len();
  let fingerprint_before = h.store.fingerprint();

  h.agent.consolidate(&call).await.unwrap();

  assert_eq!(h.store.fingerprint(), fingerprint_before);
  assert_eq!(h.store.list_audits(None).await.unwrap().len(), audits_before);
}

#[tokio::test]
async fn failed_consolidation_leaves_the_store_untouched() {
  let h = harness();
  h.agent
    .consolidate(&input("1", vec![(EntityType::System, entity("Excel"))]))
    .await
    .unwrap();

  let fingerprint_before = h.store.fingerprint();
  h.store.inject_write_failure(1, false);

  let err = h
    .agent
    .consolidate(&input(
      "2",
      vec![
        (EntityType::System, entity("Jira")),
        (EntityType::Process, entity("facturación")),
      ],
    ))
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    ConsolidationError::Failed {
      ref source,
      ..
    } if matches!(**source, ConsolidationError::Store(StoreError::Fatal(_)))
  ));
  assert_eq!(h.store.fingerprint(), fingerprint_before);
  assert_eq!(h.metrics.snapshot().consolidations_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_store_errors_are_retried() {
  let h = harness();
  h.store.inject_write_failure(0, true);

  h.agent
    .consolidate(&input("1", vec![(EntityType::System, entity("Excel"))]))
    .await
    .unwrap();

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 1);
  assert_eq!(h.metrics.snapshot().consolidations_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_embedder_hits_the_consolidation_timeout() {
  let mut config = ConsolidationConfig::default();
  // Force the semantic stage for every candidate
  config.skip_semantic_threshold = 1.1;
  let h = harness_with(config, Arc::new(HangingEmbedder));

  h.agent
    .consolidate(&input(
      "1",
      vec![(EntityType::System, entity("reporte de ventas"))],
    ))
    .await
    .unwrap();

  let err = h
    .agent
    .consolidate(&input(
      "2",
      vec![(EntityType::System, entity("reportes de ventas"))],
    ))
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    ConsolidationError::Failed { ref source, .. }
      if matches!(**source, ConsolidationError::Timeout(300))
  ));
}

// ──────────────────────────────────────────────────
// Boundaries
// ──────────────────────────────────────────────────

#[tokio::test]
async fn similarity_exactly_at_threshold_merges() {
  let score = name_similarity("reporte de ventas", "reportes de ventas");
  let mut config = ConsolidationConfig::default();
  config.type_thresholds.insert(EntityType::System, score);
  // Skip the semantic stage so the combined score equals the name score
  config.skip_semantic_threshold = score;
  let h = harness_with(config, Arc::new(StubEmbedder));

  h.agent
    .consolidate(&input(
      "1",
      vec![(EntityType::System, entity("reporte de ventas"))],
    ))
    .await
    .unwrap();
  h.agent
    .consolidate(&input(
      "2",
      vec![(EntityType::System, entity("reportes de ventas"))],
    ))
    .await
    .unwrap();

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 1, "score >= threshold must merge, not insert");
  assert_eq!(systems[0].source_count, 2);
}

#[tokio::test]
async fn accented_fields_survive_a_store_round_trip() {
  let h = harness();
  h.agent
    .consolidate(&input(
      "1",
      vec![(
        EntityType::PainPoint,
        entity_with(
          "coordinación por WhatsApp",
          None,
          Some("¿Quién contesta después de las 18h? ¡Nadie!"),
          &[("área", AttributeValue::Text("logística".into()))],
        ),
      )],
    ))
    .await
    .unwrap();

  let pains = h
    .store
    .get_entities_by_type(EntityType::PainPoint, None)
    .await
    .unwrap();
  let pain = &pains[0];
  assert_eq!(pain.name, "coordinación por WhatsApp");
  assert_eq!(
    pain.description.as_deref(),
    Some("¿Quién contesta después de las 18h? ¡Nadie!")
  );
  assert_eq!(
    pain.attributes["área"],
    AttributeValue::Text("logística".into())
  );
}

#[tokio::test]
async fn empty_name_is_rejected_before_touching_the_store() {
  let h = harness();
  let fingerprint_before = h.store.fingerprint();

  let err = h
    .agent
    .consolidate(&input("1", vec![(EntityType::System, entity("Sistema"))]))
    .await
    .unwrap_err();

  assert!(matches!(err, ConsolidationError::InvalidEntityName(_)));
  assert_eq!(h.store.fingerprint(), fingerprint_before);
  assert_eq!(h.store.get_total_interview_count().await.unwrap(), 0);
}

#[tokio::test]
async fn merge_monotonicity_unions_interview_ids() {
  let h = harness();
  for interview in ["1", "2", "2", "3", "1"] {
    h.agent
      .consolidate(&input(
        interview,
        vec![(EntityType::System, entity("Excel"))],
      ))
      .await
      .unwrap();
  }

  let systems = h
    .store
    .get_entities_by_type(EntityType::System, None)
    .await
    .unwrap();
  assert_eq!(systems.len(), 1);
  assert_eq!(systems[0].mentioned_in_interviews, vec!["1", "2", "3"]);
  assert_eq!(systems[0].source_count, 3);
}
