//! sea-orm Postgres adapter for the `EntityStore` port. Every query goes
//! through the query builder with bound values.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use comversa_core::{
  AuditRecord, ConsolidatedEntity, EntitySnapshot, EntityStore, EntityType, Pattern, PatternType,
  Relationship, RelationshipType, StoreTransaction,
};
use comversa_entities::{
  consolidated_entity, consolidation_audit, entity_snapshot, interview, pattern, relationship,
};
use comversa_shared::StoreError;
use sea_orm::{
  ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
  DatabaseTransaction, DbErr, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
  QueryOrder, QuerySelect, Set, TransactionTrait,
  prelude::{Expr, PgVector},
  sea_query::OnConflict,
};
use uuid::Uuid;

use crate::convert;

/// Lost connections are worth retrying; everything else aborts.
fn classify(err: DbErr) -> StoreError {
  match &err {
    DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => StoreError::Transient(err.to_string()),
    _ => StoreError::Fatal(err.to_string()),
  }
}

/// Single-writer transactional store over Postgres.
#[derive(Clone)]
pub struct PgEntityStore {
  db: DatabaseConnection,
}

impl PgEntityStore {
  #[must_use]
  pub const fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

// ──────────────────────────────────────────────────
// Shared query helpers
// ──────────────────────────────────────────────────

async fn entities_by_type<C: ConnectionTrait>(
  db: &C,
  entity_type: EntityType,
  limit: Option<u64>,
) -> Result<Vec<ConsolidatedEntity>, StoreError> {
  let mut query = consolidated_entity::Entity::find()
    .filter(consolidated_entity::Column::EntityType.eq(entity_type.to_string()))
    .order_by_asc(consolidated_entity::Column::CreatedAt);
  if let Some(limit) = limit {
    query = query.limit(limit);
  }
  query
    .all(db)
    .await
    .map_err(classify)?
    .into_iter()
    .map(convert::entity_from_model)
    .collect()
}

async fn entity_by_id<C: ConnectionTrait>(
  db: &C,
  entity_type: EntityType,
  id: Uuid,
) -> Result<Option<ConsolidatedEntity>, StoreError> {
  consolidated_entity::Entity::find()
    .filter(consolidated_entity::Column::Id.eq(id))
    .filter(consolidated_entity::Column::EntityType.eq(entity_type.to_string()))
    .one(db)
    .await
    .map_err(classify)?
    .map(convert::entity_from_model)
    .transpose()
}

async fn audit_by_id<C: ConnectionTrait>(
  db: &C,
  audit_id: Uuid,
) -> Result<Option<AuditRecord>, StoreError> {
  consolidation_audit::Entity::find_by_id(audit_id)
    .one(db)
    .await
    .map_err(classify)?
    .map(convert::audit_from_model)
    .transpose()
}

async fn snapshots_by_audit<C: ConnectionTrait>(
  db: &C,
  audit_id: Uuid,
) -> Result<Vec<EntitySnapshot>, StoreError> {
  entity_snapshot::Entity::find()
    .filter(entity_snapshot::Column::AuditId.eq(audit_id))
    .order_by_asc(entity_snapshot::Column::CreatedAt)
    .all(db)
    .await
    .map_err(classify)?
    .into_iter()
    .map(convert::snapshot_from_model)
    .collect()
}

async fn interview_count<C: ConnectionTrait>(db: &C) -> Result<u64, StoreError> {
  interview::Entity::find().count(db).await.map_err(classify)
}

// ──────────────────────────────────────────────────
// Read-only store surface
// ──────────────────────────────────────────────────

#[async_trait]
impl EntityStore for PgEntityStore {
  async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
    let txn = self.db.begin().await.map_err(classify)?;
    Ok(Box::new(PgTransaction { txn }))
  }

  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError> {
    entities_by_type(&self.db, entity_type, limit).await
  }

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError> {
    entity_by_id(&self.db, entity_type, id).await
  }

  async fn get_total_interview_count(&self) -> Result<u64, StoreError> {
    interview_count(&self.db).await
  }

  async fn get_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
    relationship::Entity::find()
      .order_by_asc(relationship::Column::CreatedAt)
      .all(&self.db)
      .await
      .map_err(classify)?
      .into_iter()
      .map(convert::relationship_from_model)
      .collect()
  }

  async fn get_patterns(
    &self,
    pattern_type: Option<PatternType>,
  ) -> Result<Vec<Pattern>, StoreError> {
    let mut query = pattern::Entity::find().order_by_asc(pattern::Column::DetectedAt);
    if let Some(pattern_type) = pattern_type {
      query = query.filter(pattern::Column::PatternType.eq(pattern_type.to_string()));
    }
    query
      .all(&self.db)
      .await
      .map_err(classify)?
      .into_iter()
      .map(convert::pattern_from_model)
      .collect()
  }

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError> {
    audit_by_id(&self.db, audit_id).await
  }

  async fn list_audits(
    &self,
    entity_type: Option<EntityType>,
  ) -> Result<Vec<AuditRecord>, StoreError> {
    let mut query = consolidation_audit::Entity::find()
      .order_by_asc(consolidation_audit::Column::ConsolidatedAt);
    if let Some(entity_type) = entity_type {
      query = query.filter(consolidation_audit::Column::EntityType.eq(entity_type.to_string()));
    }
    query
      .all(&self.db)
      .await
      .map_err(classify)?
      .into_iter()
      .map(convert::audit_from_model)
      .collect()
  }

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError> {
    snapshots_by_audit(&self.db, audit_id).await
  }

  async fn get_entity_embedding(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<(Vec<f32>, String)>, StoreError> {
    let entity = entity_by_id(&self.db, entity_type, id).await?;
    Ok(entity.and_then(|entity| {
      match (entity.embedding, entity.embedding_text_hash) {
        (Some(vector), Some(hash)) => Some((vector, hash)),
        _ => None,
      }
    }))
  }

  async fn find_orphan_relationships(&self) -> Result<Vec<Relationship>, StoreError> {
    let entity_ids: Vec<Uuid> = consolidated_entity::Entity::find()
      .select_only()
      .column(consolidated_entity::Column::Id)
      .into_tuple()
      .all(&self.db)
      .await
      .map_err(classify)?;
    let known: HashSet<Uuid> = entity_ids.into_iter().collect();

    let relationships = self.get_relationships().await?;
    Ok(
      relationships
        .into_iter()
        .filter(|rel| {
          !known.contains(&rel.source_entity_id) || !known.contains(&rel.target_entity_id)
        })
        .collect(),
    )
  }
}

// ──────────────────────────────────────────────────
// Transactional surface
// ──────────────────────────────────────────────────

pub struct PgTransaction {
  txn: DatabaseTransaction,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
  async fn get_entities_by_type(
    &self,
    entity_type: EntityType,
    limit: Option<u64>,
  ) -> Result<Vec<ConsolidatedEntity>, StoreError> {
    entities_by_type(&self.txn, entity_type, limit).await
  }

  async fn get_entity(
    &self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<Option<ConsolidatedEntity>, StoreError> {
    entity_by_id(&self.txn, entity_type, id).await
  }

  async fn insert_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<Uuid, StoreError> {
    debug_assert_eq!(entity.entity_type, entity_type);
    let model = convert::entity_to_model(entity)?;
    model
      .into_active_model()
      .insert(&self.txn)
      .await
      .map_err(classify)?;
    Ok(entity.id)
  }

  async fn update_consolidated_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    state: &ConsolidatedEntity,
    _interview_id: &str,
  ) -> Result<(), StoreError> {
    debug_assert_eq!(state.id, id);
    debug_assert_eq!(state.entity_type, entity_type);
    let model = convert::entity_to_model(state)?;
    model
      .into_active_model()
      .update(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn restore_entity(
    &mut self,
    entity_type: EntityType,
    entity: &ConsolidatedEntity,
  ) -> Result<(), StoreError> {
    let model = convert::entity_to_model(entity)?;
    let exists = entity_by_id(&self.txn, entity_type, entity.id).await?.is_some();
    if exists {
      model
        .into_active_model()
        .update(&self.txn)
        .await
        .map_err(classify)?;
    } else {
      model
        .into_active_model()
        .insert(&self.txn)
        .await
        .map_err(classify)?;
    }
    Ok(())
  }

  async fn remove_absorbed_entity(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
  ) -> Result<(), StoreError> {
    consolidated_entity::Entity::delete_many()
      .filter(consolidated_entity::Column::Id.eq(id))
      .filter(consolidated_entity::Column::EntityType.eq(entity_type.to_string()))
      .exec(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn find_relationship(
    &self,
    source_entity_id: Uuid,
    target_entity_id: Uuid,
    relationship_type: RelationshipType,
  ) -> Result<Option<Relationship>, StoreError> {
    relationship::Entity::find()
      .filter(relationship::Column::SourceEntityId.eq(source_entity_id))
      .filter(relationship::Column::TargetEntityId.eq(target_entity_id))
      .filter(relationship::Column::RelationshipType.eq(relationship_type.to_string()))
      .one(&self.txn)
      .await
      .map_err(classify)?
      .map(convert::relationship_from_model)
      .transpose()
  }

  async fn get_relationships_for_entity(
    &self,
    entity_id: Uuid,
  ) -> Result<Vec<Relationship>, StoreError> {
    relationship::Entity::find()
      .filter(
        Condition::any()
          .add(relationship::Column::SourceEntityId.eq(entity_id))
          .add(relationship::Column::TargetEntityId.eq(entity_id)),
      )
      .all(&self.txn)
      .await
      .map_err(classify)?
      .into_iter()
      .map(convert::relationship_from_model)
      .collect()
  }

  async fn insert_relationship(&mut self, rel: &Relationship) -> Result<(), StoreError> {
    convert::relationship_to_model(rel)
      .into_active_model()
      .insert(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn update_relationship(&mut self, rel: &Relationship) -> Result<(), StoreError> {
    convert::relationship_to_model(rel)
      .into_active_model()
      .update(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn delete_relationship(&mut self, id: Uuid) -> Result<(), StoreError> {
    relationship::Entity::delete_by_id(id)
      .exec(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn insert_audit(&mut self, record: &AuditRecord) -> Result<Uuid, StoreError> {
    convert::audit_to_model(record)
      .into_active_model()
      .insert(&self.txn)
      .await
      .map_err(classify)?;
    Ok(record.id)
  }

  async fn mark_audit_rolled_back(
    &mut self,
    audit_id: Uuid,
    rolled_back_at: DateTime<Utc>,
    reason: &str,
  ) -> Result<(), StoreError> {
    let active = consolidation_audit::ActiveModel {
      id: Set(audit_id),
      rolled_back_at: Set(Some(rolled_back_at.into())),
      rollback_reason: Set(Some(reason.to_owned())),
      ..Default::default()
    };
    active.update(&self.txn).await.map_err(classify)?;
    Ok(())
  }

  async fn get_audit(&self, audit_id: Uuid) -> Result<Option<AuditRecord>, StoreError> {
    audit_by_id(&self.txn, audit_id).await
  }

  async fn insert_snapshot(&mut self, snapshot: &EntitySnapshot) -> Result<(), StoreError> {
    convert::snapshot_to_model(snapshot)
      .into_active_model()
      .insert(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn get_snapshots_for_audit(
    &self,
    audit_id: Uuid,
  ) -> Result<Vec<EntitySnapshot>, StoreError> {
    snapshots_by_audit(&self.txn, audit_id).await
  }

  async fn upsert_interview(
    &mut self,
    interview_id: &str,
    seen_at: DateTime<Utc>,
  ) -> Result<(), StoreError> {
    let active = interview::ActiveModel {
      id: Set(interview_id.to_owned()),
      first_seen_at: Set(seen_at.into()),
    };
    interview::Entity::insert(active)
      .on_conflict(
        OnConflict::column(interview::Column::Id)
          .do_nothing()
          .to_owned(),
      )
      .exec_without_returning(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn get_total_interview_count(&self) -> Result<u64, StoreError> {
    interview_count(&self.txn).await
  }

  async fn put_entity_embedding(
    &mut self,
    entity_type: EntityType,
    id: Uuid,
    vector: &[f32],
    text_hash: &str,
  ) -> Result<(), StoreError> {
    consolidated_entity::Entity::update_many()
      .col_expr(
        consolidated_entity::Column::Embedding,
        Expr::value(PgVector::from(vector.to_vec())),
      )
      .col_expr(
        consolidated_entity::Column::EmbeddingTextHash,
        Expr::value(text_hash),
      )
      .filter(consolidated_entity::Column::Id.eq(id))
      .filter(consolidated_entity::Column::EntityType.eq(entity_type.to_string()))
      .exec(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn replace_patterns(
    &mut self,
    pattern_type: PatternType,
    patterns: &[Pattern],
  ) -> Result<(), StoreError> {
    pattern::Entity::delete_many()
      .filter(pattern::Column::PatternType.eq(pattern_type.to_string()))
      .exec(&self.txn)
      .await
      .map_err(classify)?;

    if patterns.is_empty() {
      return Ok(());
    }
    let models = patterns
      .iter()
      .map(|p| convert::pattern_to_model(p).into_active_model());
    pattern::Entity::insert_many(models)
      .exec(&self.txn)
      .await
      .map_err(classify)?;
    Ok(())
  }

  async fn commit(self: Box<Self>) -> Result<(), StoreError> {
    self.txn.commit().await.map_err(classify)
  }

  async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
    self.txn.rollback().await.map_err(classify)
  }
}
