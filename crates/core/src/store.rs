use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comversa_shared::StoreError;
use uuid::Uuid;

use crate::{
  AuditRecord, ConsolidatedEntity, EntitySnapshot, EntityType, Pattern, PatternType, Relationship,
  RelationshipType,
};

/// Persistence port for the consolidation core.
///
/// Read-only operations live here; every mutation goes through a
/// `StoreTransaction` obtained from `begin`, with single-writer semantics
/// sufficient to make one consolidation atomic. Entity types arrive as the
/// closed enum, so an out-of-set tag can never reach an adapter.
#[async_trait]
pub trait EntityStore: Send + Sync {
  async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError>;

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError>;

  async fn get_total_interview_count(&self) -> Result<u64, StoreError>;

  async fn get_relationships(&self) -> Result<Vec<Relationship>, StoreError>;

  async fn get_patterns(
    &self,
    pattern_type: Option<PatternType>,
  ) -> Result<Vec<Pattern>, StoreError>;

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError>;

  /// Audit trail ordered by consolidation time, optionally scoped to a type.
  async fn list_audits(
    &self,
    entity_type: Option<EntityType>,
  ) -> Result<Vec<AuditRecord>, StoreError>;

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError>;

  async fn get_entity_embedding(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<(Vec<f32>, String)>, StoreError>;

  /// Relationships whose endpoints no longer reference stored entities.
  /// Reported, never purged.
  async fn find_orphan_relationships(&self) -> Result<Vec<Relationship>, StoreError>;
}

/// One atomic unit of consolidation work. Dropped without `commit`, every
/// mutation is discarded.
#[async_trait]
pub trait StoreTransaction: Send {
  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError>;

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError>;

  /// Persist a new entity under its pre-assigned id; returns that id.
  async fn insert_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<Uuid, StoreError>;

  /// Overwrite an entity with its post-merge state. Idempotent with respect
  /// to `interview_id`: the state's provenance already carries it
  /// deduplicated.
  async fn update_consolidated_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    state: &ConsolidatedEntity,
    interview_id: &str,
  ) -> Result<(), StoreError>;

  /// Upsert an entity from a snapshot during rollback.
  async fn restore_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<(), StoreError>;

  /// Remove a standalone row that a merge has just absorbed; its state is
  /// preserved in the merge's snapshot.
  async fn remove_absorbed_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<(), StoreError>;

  async fn find_relationship(
    &self,
    source_entity_id: Uuid,
    target_entity_id: Uuid,
    relationship_type: RelationshipType,
  ) -> Result<Option<Relationship>, StoreError>;

  /// All relationships touching an entity on either endpoint.
  async fn get_relationships_for_entity(
    &self,
    entity_id: Uuid,
  ) -> Result<Vec<Relationship>, StoreError>;

  async fn insert_relationship(&mut self, relationship: &Relationship) -> Result<(), StoreError>;

  async fn update_relationship(&mut self, relationship: &Relationship) -> Result<(), StoreError>;

  async fn delete_relationship(&mut self, id: Uuid) -> Result<(), StoreError>;

  async fn insert_audit(&mut self, record: &AuditRecord) -> Result<Uuid, StoreError>;

  async fn mark_audit_rolled_back(
    &mut self,
    audit_id: Uuid,
    rolled_back_at: DateTime<Utc>,
    reason: &str,
  ) -> Result<(), StoreError>;

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError>;

  async fn insert_snapshot(&mut self, snapshot: &EntitySnapshot) -> Result<(), StoreError>;

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError>;

  async fn upsert_interview(
    &mut self,
    interview_id: &str,
    seen_at: DateTime<Utc>,
  ) -> Result<(), StoreError>;

  async fn get_total_interview_count(&self) -> Result<u64, StoreError>;

  async fn put_entity_embedding(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    vector: &[f32],
    text_hash: &str,
  ) -> Result<(), StoreError>;

  /// Replace every persisted pattern of one type with the given rows.
  async fn replace_patterns(
    &mut self,
    pattern_type: PatternType,
    patterns: &[Pattern],
  ) -> Result<(), StoreError>;

  async fn commit(self: Box<Self>) -> Result<(), StoreError>;

  async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
