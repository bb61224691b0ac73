//! In-memory `EntityStore` adapter with the same single-writer transaction
//! discipline as the Postgres one: a transaction works on a copy of the
//! state and swaps it in on commit. Used by the integration suite and by
//! embedded deployments that do not need durability.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comversa_core::{
  AuditRecord, ConsolidatedEntity, EntitySnapshot, EntityStore, EntityType, Pattern, PatternType,
  Relationship, RelationshipType, StoreTransaction,
};
use comversa_shared::StoreError;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemState {
  entities: Vec<ConsolidatedEntity>,
  relationships: Vec<Relationship>,
  audits: Vec<AuditRecord>,
  snapshots: Vec<EntitySnapshot>,
  interviews: Vec<(String, DateTime<Utc>)>,
  patterns: Vec<Pattern>,
}

/// One injected write failure, armed by tests to exercise the atomicity and
/// retry paths.
#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
  writes_before_failure: u64,
  transient: bool,
}

#[derive(Clone, Default)]
pub struct MemEntityStore {
  state: Arc<RwLock<MemState>>,
  writer: Arc<tokio::sync::Mutex<()>>,
  failure: Arc<Mutex<Option<InjectedFailure>>>,
}

impl MemEntityStore {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Arm a one-shot failure on the nth subsequent write (0 = next write).
  pub fn inject_write_failure(&self, writes_before_failure: u64, transient: bool) {
    *self.failure.lock() = Some(InjectedFailure {
      writes_before_failure,
      transient,
    });
  }

  /// Deep equality probe for atomicity assertions.
  #[must_use]
  pub fn fingerprint(&self) -> String {
    let state = self.state.read();
    format!(
      "{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
      state.entities,
      state.relationships,
      state.audits,
      state.snapshots,
      state.interviews,
      state.patterns
    )
  }
}

fn entities_of_type(
  state: &MemState,
  entity_type: EntityType,
  limit: Option<u64>,
) -> Vec<ConsolidatedEntity> {
  let iter = state
    .entities
    .iter()
    .filter(|entity| entity.entity_type == entity_type)
    .cloned();
  match limit {
    Some(limit) => iter.take(limit as usize).collect(),
    None => iter.collect(),
  }
}

fn entity_of(state: &MemState, entity_type: EntityType, id: Uuid) -> Option<ConsolidatedEntity> {
  state
    .entities
    .iter()
    .find(|entity| entity.id == id && entity.entity_type == entity_type)
    .cloned()
}

#[async_trait]
impl EntityStore for MemEntityStore {
  async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
    let guard = Arc::clone(&self.writer).lock_owned().await;
    let working = self.state.read().clone();
    Ok(Box::new(MemTransaction {
      _writer: guard,
      shared: Arc::clone(&self.state),
      failure: Arc::clone(&self.failure),
      working,
    }))
  }

  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError> {
    Ok(entities_of_type(&self.state.read(), entity_type, limit))
  }

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError> {
    Ok(entity_of(&self.state.read(), entity_type, id))
  }

  async fn get_total_interview_count(&self) -> Result<u64, StoreError> {
    Ok(self.state.read().interviews.len() as u64)
  }

  async fn get_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
    Ok(self.state.read().relationships.clone())
  }

  async fn get_patterns(
    &self,
    pattern_type: Option<PatternType>,
  ) -> Result<Vec<Pattern>, StoreError> {
    let state = self.state.read();
    Ok(
      state
        .patterns
        .iter()
        .filter(|pattern| pattern_type.is_none_or(|ty| pattern.pattern_type == ty))
        .cloned()
        .collect(),
    )
  }

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError> {
    Ok(
      self
        .state
        .read()
        .audits
        .iter()
        .find(|audit| audit.id == audit_id)
        .cloned(),
    )
  }

  async fn list_audits(
    &self,
    entity_type: Option<EntityType>,
  ) -> Result<Vec<AuditRecord>, StoreError> {
    Ok(
      self
        .state
        .read()
        .audits
        .iter()
        .filter(|audit| entity_type.is_none_or(|ty| audit.entity_type == ty))
        .cloned()
        .collect(),
    )
  }

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError> {
    Ok(
      self
        .state
        .read()
        .snapshots
        .iter()
        .filter(|snapshot| snapshot.audit_id == audit_id)
        .cloned()
        .collect(),
    )
  }

  async fn get_entity_embedding(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<(Vec<f32>, String)>, StoreError> {
    Ok(entity_of(&self.state.read(), entity_type, id).and_then(|entity| {
      match (entity.embedding, entity.embedding_text_hash) {
        (Some(vector), Some(hash)) => Some((vector, hash)),
        _ => None,
      }
    }))
  }

  async fn find_orphan_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
    let state = self.state.read();
    let known: HashSet<Uuid> = state.entities.iter().map(|entity| entity.id).collect();
    Ok(
      state
        .relationships
        .iter()
        .filter(|rel| {
          !known.contains(&rel.source_entity_id) || !known.contains(&rel.target_entity_id)
        })
        .cloned()
        .collect(),
    )
  }
}

pub struct MemTransaction {
  _writer: tokio::sync::OwnedMutexGuard<()>,
  shared: Arc<RwLock<MemState>>,
  failure: Arc<Mutex<Option<InjectedFailure>>>,
  working: MemState,
}

impl MemTransaction {
  fn check_failure(&self) -> Result<(), StoreError> {
    let mut slot = self.failure.lock();
    if let Some(mut plan) = slot.take() {
      if plan.writes_before_failure == 0 {
        return Err(if plan.transient {
          StoreError::Transient("injected transient failure".into())
        } else {
          StoreError::Fatal("injected fatal failure".into())
        });
      }
      plan.writes_before_failure -= 1;
      *slot = Some(plan);
    }
    Ok(())
  }
}

#[async_trait]
impl StoreTransaction for MemTransaction {
  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError> {
    Ok(entities_of_type(&self.working, entity_type, limit))
  }

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError> {
    Ok(entity_of(&self.working, entity_type, id))
  }

  async fn insert_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<Uuid, StoreError> {
    self.check_failure()?;
    debug_assert_eq!(entity.entity_type, entity_type);
    if entity_of(&self.working, entity_type, entity.id).is_some() {
      return Err(StoreError::Fatal(format!(
        "duplicate entity id {}",
        entity.id
      )));
    }
    self.working.entities.push(entity.clone());
    Ok(entity.id)
  }

  async fn update_consolidated_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    state: &ConsolidatedEntity,
    _interview_id: &str,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    let slot = self
      .working
      .entities
      .iter_mut()
      .find(|entity| entity.id == id && entity.entity_type == entity_type)
      .ok_or_else(|| StoreError::NotFound(format!("entity {id}")))?;
    *slot = state.clone();
    Ok(())
  }

  async fn restore_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    match self
      .working
      .entities
      .iter_mut()
      .find(|candidate| candidate.id == entity.id && candidate.entity_type == entity_type)
    {
      Some(slot) => *slot = entity.clone(),
      None => self.working.entities.push(entity.clone()),
    }
    Ok(())
  }

  async fn remove_absorbed_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    self
      .working
      .entities
      .retain(|entity| !(entity.id == id && entity.entity_type == entity_type));
    Ok(())
  }

  async fn find_relationship(
    &self,
    source_entity_id: Uuid,
    target_entity_id: Uuid,
    relationship_type: RelationshipType,
  ) -> Result<Option<Relationship>, StoreError> {
    Ok(
      self
        .working
        .relationships
        .iter()
        .find(|rel| {
          rel.source_entity_id == source_entity_id
            && rel.target_entity_id == target_entity_id
            && rel.relationship_type == relationship_type
        })
        .cloned(),
    )
  }

  async fn get_relationships_for_entity(
    &self,
    entity_id: Uuid,
  ) -> Result<Vec<Relationship>, StoreError> {
    Ok(
      self
        .working
        .relationships
        .iter()
        .filter(|rel| rel.source_entity_id == entity_id || rel.target_entity_id == entity_id)
        .cloned()
        .collect(),
    )
  }

  async fn insert_relationship(&mut self, rel: &Relationship) -> Result<(), StoreError> {
    self.check_failure()?;
    self.working.relationships.push(rel.clone());
    Ok(())
  }

  async fn update_relationship(&mut self, rel: &Relationship) -> Result<(), StoreError> {
    self.check_failure()?;
    let slot = self
      .working
      .relationships
      .iter_mut()
      .find(|candidate| candidate.id == rel.id)
      .ok_or_else(|| StoreError::NotFound(format!("relationship {}", rel.id)))?;
    *slot = rel.clone();
    Ok(())
  }

  async fn delete_relationship(&mut self, id: Uuid) -> Result<(), StoreError> {
    self.check_failure()?;
    self.working.relationships.retain(|rel| rel.id != id);
    Ok(())
  }

  async fn insert_audit(&mut self, record: &AuditRecord) -> Result<Uuid, StoreError> {
    self.check_failure()?;
    self.working.audits.push(record.clone());
    Ok(record.id)
  }

  async fn mark_audit_rolled_back(
    &mut self,
    audit_id: Uuid,
    rolled_back_at: DateTime<Utc>,
    reason: &str,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    let audit = self
      .working
      .audits
      .iter_mut()
      .find(|audit| audit.id == audit_id)
      .ok_or_else(|| StoreError::NotFound(format!("audit record {audit_id}")))?;
    audit.rolled_back_at = Some(rolled_back_at);
    audit.rollback_reason = Some(reason.to_owned());
    Ok(())
  }

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError> {
    Ok(
      self
        .working
        .audits
        .iter()
        .find(|audit| audit.id == audit_id)
        .cloned(),
    )
  }

  async fn insert_snapshot(&mut self, snapshot: &EntitySnapshot) -> Result<(), StoreError> {
    self.check_failure()?;
    self.working.snapshots.push(snapshot.clone());
    Ok(())
  }

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError> {
    Ok(
      self
        .working
        .snapshots
        .iter()
        .filter(|snapshot| snapshot.audit_id == audit_id)
        .cloned()
        .collect(),
    )
  }

  async fn upsert_interview(
    &mut self,
    interview_id: &str,
    seen_at: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    if !self
      .working
      .interviews
      .iter()
      .any(|(id, _)| id == interview_id)
    {
      self
        .working
        .interviews
        .push((interview_id.to_owned(), seen_at));
    }
    Ok(())
  }

  async fn get_total_interview_count(&self) -> Result<u64, StoreError> {
    Ok(self.working.interviews.len() as u64)
  }

  async fn put_entity_embedding(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    vector: &[f32],
    text_hash: &str,
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    let slot = self
      .working
      .entities
      .iter_mut()
      .find(|entity| entity.id == id && entity.entity_type == entity_type)
      .ok_or_else(|| StoreError::NotFound(format!("entity {id}")))?;
    slot.embedding = Some(vector.to_vec());
    slot.embedding_text_hash = Some(text_hash.to_owned());
    Ok(())
  }

  async fn replace_patterns(
    &mut self,
    pattern_type: PatternType,
    patterns: &[Pattern],
  ) -> Result<(), StoreError> {
    self.check_failure()?;
    self
      .working
      .patterns
      .retain(|pattern| pattern.pattern_type != pattern_type);
    self.working.patterns.extend_from_slice(patterns);
    Ok(())
  }

  async fn commit(self: Box<Self>) -> Result<(), StoreError> {
    *self.shared.write() = self.working;
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
    // Working copy is simply discarded.
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use comversa_core::ExtractedEntity;

  use super::*;

  fn sample_entity(name: &str) -> ConsolidatedEntity {
    let extracted = ExtractedEntity {
      id: None,
      name: name.to_owned(),
      description: None,
      attributes: BTreeMap::new(),
      company: None,
      business_unit: None,
      department: None,
    };
    ConsolidatedEntity::from_extracted(
      &extracted,
      EntityType::System,
      Uuid::now_v7(),
      "entrevista-001",
      Utc::now(),
    )
  }

  #[tokio::test]
  async fn committed_writes_become_visible() {
    let store = MemEntityStore::new();
    let entity = sample_entity("Excel");

    let mut txn = store.begin().await.unwrap();
    txn.insert_entity(EntityType::System, &entity).await.unwrap();
    txn.commit().await.unwrap();

    let stored = store
      .get_entities_by_type(EntityType::System, None)
      .await
      .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "Excel");
  }

  #[tokio::test]
  async fn rolled_back_writes_vanish() {
    let store = MemEntityStore::new();
    let before = store.fingerprint();

    let mut txn = store.begin().await.unwrap();
    txn
      .insert_entity(EntityType::System, &sample_entity("SAP"))
      .await
      .unwrap();
    txn.rollback().await.unwrap();

    assert_eq!(store.fingerprint(), before);
  }

  #[tokio::test]
  async fn transactions_see_their_own_writes_but_not_uncommitted_peers() {
    let store = MemEntityStore::new();
    let mut txn = store.begin().await.unwrap();
    txn
      .insert_entity(EntityType::System, &sample_entity("Jira"))
      .await
      .unwrap();

    let inside = txn
      .get_entities_by_type(EntityType::System, None)
      .await
      .unwrap();
    assert_eq!(inside.len(), 1);

    let outside = store
      .get_entities_by_type(EntityType::System, None)
      .await
      .unwrap();
    assert!(outside.is_empty());

    txn.commit().await.unwrap();
  }

  #[tokio::test]
  async fn injected_failure_fires_once() {
    let store = MemEntityStore::new();
    store.inject_write_failure(0, true);

    let mut txn = store.begin().await.unwrap();
    let err = txn
      .insert_entity(EntityType::System, &sample_entity("Excel"))
      .await
      .unwrap_err();
    assert!(err.is_transient());

    // Next write goes through
    txn
      .insert_entity(EntityType::System, &sample_entity("Excel"))
      .await
      .unwrap();
    txn.commit().await.unwrap();
  }

  #[tokio::test]
  async fn interviews_are_upserted_once() {
    let store = MemEntityStore::new();
    let mut txn = store.begin().await.unwrap();
    txn.upsert_interview("1", Utc::now()).await.unwrap();
    txn.upsert_interview("1", Utc::now()).await.unwrap();
    txn.upsert_interview("2", Utc::now()).await.unwrap();
    assert_eq!(txn.get_total_interview_count().await.unwrap(), 2);
    txn.commit().await.unwrap();

    assert_eq!(store.get_total_interview_count().await.unwrap(), 2);
  }
}
