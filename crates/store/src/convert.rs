//! Conversions between the core domain types and the sea-orm row models.

use chrono::Utc;
use comversa_core::{
  AuditRecord, ConsolidatedEntity, EntitySnapshot, EntityType, Pattern, PatternType, Relationship,
  RelationshipType,
};
use comversa_entities::{
  consolidated_entity, consolidation_audit, entity_snapshot, pattern, relationship,
};
use comversa_shared::StoreError;
use sea_orm::prelude::PgVector;

fn bad_row(context: &str, err: impl std::fmt::Display) -> StoreError {
  StoreError::Fatal(format!("corrupt {context} row: {err}"))
}

pub fn entity_to_model(entity: &ConsolidatedEntity) -> Result<consolidated_entity::Model, StoreError> {
  Ok(consolidated_entity::Model {
    id: entity.id,
    entity_type: entity.entity_type.to_string(),
    name: entity.name.clone(),
    description: entity.description.clone(),
    attributes: serde_json::to_value(&entity.attributes)
      .map_err(|err| bad_row("entity attributes", err))?,
    company: entity.company.clone(),
    business_unit: entity.business_unit.clone(),
    department: entity.department.clone(),
    mentioned_in_interviews: entity.mentioned_in_interviews.clone(),
    source_count: entity.source_count as i32,
    first_mentioned_at: entity.first_mentioned_at.into(),
    last_mentioned_at: entity.last_mentioned_at.into(),
    merged_entity_ids: entity.merged_entity_ids.clone(),
    is_consolidated: entity.is_consolidated,
    consensus_confidence: entity.consensus_confidence,
    needs_review: entity.needs_review,
    has_contradictions: entity.has_contradictions,
    contradiction_details: serde_json::to_value(&entity.contradiction_details)
      .map_err(|err| bad_row("entity contradictions", err))?,
    consolidated_at: entity.consolidated_at.map(Into::into),
    embedding: entity.embedding.clone().map(PgVector::from),
    embedding_text_hash: entity.embedding_text_hash.clone(),
    created_at: entity.created_at.into(),
  })
}

pub fn entity_from_model(model: consolidated_entity::Model) -> Result<ConsolidatedEntity, StoreError> {
  Ok(ConsolidatedEntity {
    id: model.id,
    entity_type: EntityType::parse(&model.entity_type)
      .map_err(|err| bad_row("entity type", err))?,
    name: model.name,
    description: model.description,
    attributes: serde_json::from_value(model.attributes)
      .map_err(|err| bad_row("entity attributes", err))?,
    company: model.company,
    business_unit: model.business_unit,
    department: model.department,
    mentioned_in_interviews: model.mentioned_in_interviews,
    source_count: model.source_count.max(0) as u32,
    first_mentioned_at: model.first_mentioned_at.with_timezone(&Utc),
    last_mentioned_at: model.last_mentioned_at.with_timezone(&Utc),
    merged_entity_ids: model.merged_entity_ids,
    is_consolidated: model.is_consolidated,
    consensus_confidence: model.consensus_confidence,
    needs_review: model.needs_review,
    has_contradictions: model.has_contradictions,
    contradiction_details: serde_json::from_value(model.contradiction_details)
      .map_err(|err| bad_row("entity contradictions", err))?,
    consolidated_at: model.consolidated_at.map(|at| at.with_timezone(&Utc)),
    embedding: model.embedding.map(|vector| vector.to_vec()),
    embedding_text_hash: model.embedding_text_hash,
    created_at: model.created_at.with_timezone(&Utc),
  })
}

pub fn relationship_to_model(relationship: &Relationship) -> relationship::Model {
  relationship::Model {
    id: relationship.id,
    source_entity_id: relationship.source_entity_id,
    source_entity_type: relationship.source_entity_type.to_string(),
    target_entity_id: relationship.target_entity_id,
    target_entity_type: relationship.target_entity_type.to_string(),
    relationship_type: relationship.relationship_type.to_string(),
    strength: relationship.strength,
    mentioned_in_interviews: relationship.mentioned_in_interviews.clone(),
    created_at: relationship.created_at.into(),
    updated_at: relationship.updated_at.into(),
  }
}

pub fn relationship_from_model(model: relationship::Model) -> Result<Relationship, StoreError> {
  Ok(Relationship {
    id: model.id,
    source_entity_id: model.source_entity_id,
    source_entity_type: EntityType::parse(&model.source_entity_type)
      .map_err(|err| bad_row("relationship source type", err))?,
    target_entity_id: model.target_entity_id,
    target_entity_type: EntityType::parse(&model.target_entity_type)
      .map_err(|err| bad_row("relationship target type", err))?,
    relationship_type: model
      .relationship_type
      .parse::<RelationshipType>()
      .map_err(|err| bad_row("relationship type", err))?,
    strength: model.strength,
    mentioned_in_interviews: model.mentioned_in_interviews,
    created_at: model.created_at.with_timezone(&Utc),
    updated_at: model.updated_at.with_timezone(&Utc),
  })
}

pub fn audit_to_model(record: &AuditRecord) -> consolidation_audit::Model {
  consolidation_audit::Model {
    id: record.id,
    entity_type: record.entity_type.to_string(),
    merged_entity_ids: record.merged_entity_ids.clone(),
    resulting_entity_id: record.resulting_entity_id,
    similarity_score: record.similarity_score,
    consolidated_at: record.consolidated_at.into(),
    rolled_back_at: record.rolled_back_at.map(Into::into),
    rollback_reason: record.rollback_reason.clone(),
  }
}

pub fn audit_from_model(model: consolidation_audit::Model) -> Result<AuditRecord, StoreError> {
  Ok(AuditRecord {
    id: model.id,
    entity_type: EntityType::parse(&model.entity_type)
      .map_err(|err| bad_row("audit entity type", err))?,
    merged_entity_ids: model.merged_entity_ids,
    resulting_entity_id: model.resulting_entity_id,
    similarity_score: model.similarity_score,
    consolidated_at: model.consolidated_at.with_timezone(&Utc),
    rolled_back_at: model.rolled_back_at.map(|at| at.with_timezone(&Utc)),
    rollback_reason: model.rollback_reason,
  })
}

pub fn snapshot_to_model(snapshot: &EntitySnapshot) -> entity_snapshot::Model {
  entity_snapshot::Model {
    id: snapshot.id,
    audit_id: snapshot.audit_id,
    entity_type: snapshot.entity_type.to_string(),
    entity_id: snapshot.entity_id,
    entity_state: snapshot.entity_state.clone(),
    created_at: snapshot.created_at.into(),
  }
}

pub fn snapshot_from_model(model: entity_snapshot::Model) -> Result<EntitySnapshot, StoreError> {
  Ok(EntitySnapshot {
    id: model.id,
    audit_id: model.audit_id,
    entity_type: EntityType::parse(&model.entity_type)
      .map_err(|err| bad_row("snapshot entity type", err))?,
    entity_id: model.entity_id,
    entity_state: model.entity_state,
    created_at: model.created_at.with_timezone(&Utc),
  })
}

pub fn pattern_to_model(pattern: &Pattern) -> pattern::Model {
  pattern::Model {
    id: pattern.id,
    pattern_type: pattern.pattern_type.to_string(),
    entity_type: pattern.entity_type.to_string(),
    entity_id: pattern.entity_id,
    pattern_frequency: pattern.pattern_frequency,
    source_count: pattern.source_count as i32,
    high_priority: pattern.high_priority,
    description: pattern.description.clone(),
    detected_at: pattern.detected_at.into(),
  }
}

pub fn pattern_from_model(model: pattern::Model) -> Result<Pattern, StoreError> {
  Ok(Pattern {
    id: model.id,
    pattern_type: model
      .pattern_type
      .parse::<PatternType>()
      .map_err(|err| bad_row("pattern type", err))?,
    entity_type: EntityType::parse(&model.entity_type)
      .map_err(|err| bad_row("pattern entity type", err))?,
    entity_id: model.entity_id,
    pattern_frequency: model.pattern_frequency,
    source_count: model.source_count.max(0) as u32,
    high_priority: model.high_priority,
    description: model.description,
    detected_at: model.detected_at.with_timezone(&Utc),
  })
}
