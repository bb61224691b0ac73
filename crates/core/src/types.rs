use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comversa_shared::ConsolidationError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ──────────────────────────────────────────────────
// Entity type tag set
// ──────────────────────────────────────────────────

/// Closed set of entity tags. Fixed at startup; every operation referring to
/// a type outside this set fails with `InvalidEntityType` before touching the
/// store.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  ToSchema,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
  strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
  PainPoint,
  Process,
  System,
  Kpi,
  AutomationCandidate,
  Inefficiency,
  CommunicationChannel,
  DecisionPoint,
  DataFlow,
  TemporalPattern,
  FailureMode,
  TeamStructure,
  KnowledgeGap,
  SuccessPattern,
  BudgetConstraint,
  ExternalDependency,
  Relationship,
  Pattern,
}

impl EntityType {
  /// Parse a tag string, mapping unknown tags to the domain error.
  pub fn parse(tag: &str) -> Result<Self, ConsolidationError> {
    tag
      .parse()
      .map_err(|_| ConsolidationError::InvalidEntityType(tag.to_owned()))
  }

  /// Processing order within one consolidation: systems and processes before
  /// pain points so relationship discovery has targets, remaining types in
  /// declaration order.
  pub const CONSOLIDATION_ORDER: [Self; 18] = [
    Self::System,
    Self::Process,
    Self::Kpi,
    Self::AutomationCandidate,
    Self::PainPoint,
    Self::Inefficiency,
    Self::CommunicationChannel,
    Self::DecisionPoint,
    Self::DataFlow,
    Self::TemporalPattern,
    Self::FailureMode,
    Self::TeamStructure,
    Self::KnowledgeGap,
    Self::SuccessPattern,
    Self::BudgetConstraint,
    Self::ExternalDependency,
    Self::Relationship,
    Self::Pattern,
  ];
}

// ──────────────────────────────────────────────────
// Attribute values
// ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ScalarValue {
  Number(f64),
  Text(String),
}

/// Attribute values are strings, numbers, or ordered sequences thereof.
/// Attribute names are type-dependent (severity, frequency, sentiment, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AttributeValue {
  Number(f64),
  Text(String),
  List(Vec<ScalarValue>),
}

impl AttributeValue {
  #[must_use]
  pub fn is_empty(&self) -> bool {
    match self {
      Self::Number(_) => false,
      Self::Text(text) => text.trim().is_empty(),
      Self::List(items) => items.is_empty(),
    }
  }
}

// ──────────────────────────────────────────────────
// Input records
// ──────────────────────────────────────────────────

/// One raw entity as handed over by the extraction pipeline.
///
/// `id` is optional; the agent assigns a v7 uuid when the extractor did not
/// supply one, so the audit trail can always reference the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedEntity {
  #[serde(default)]
  pub id: Option<Uuid>,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub attributes: BTreeMap<String, AttributeValue>,
  #[serde(default)]
  pub company: Option<String>,
  #[serde(default)]
  pub business_unit: Option<String>,
  #[serde(default)]
  pub department: Option<String>,
}

// ──────────────────────────────────────────────────
// Consolidated entities
// ──────────────────────────────────────────────────

/// Per-attribute disagreement between sources. The existing value is kept;
/// the conflict is recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Contradiction {
  pub attribute: String,
  pub values: Vec<AttributeValue>,
  pub source_interviews: Vec<String>,
  pub similarity: f64,
}

/// One deduplicated, source-tracked entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsolidatedEntity {
  pub id: Uuid,
  pub entity_type: EntityType,
  pub name: String,
  pub description: Option<String>,
  pub attributes: BTreeMap<String, AttributeValue>,
  pub company: Option<String>,
  pub business_unit: Option<String>,
  pub department: Option<String>,
  pub mentioned_in_interviews: Vec<String>,
  pub source_count: u32,
  pub first_mentioned_at: DateTime<Utc>,
  pub last_mentioned_at: DateTime<Utc>,
  pub merged_entity_ids: Vec<Uuid>,
  pub is_consolidated: bool,
  pub consensus_confidence: f64,
  pub needs_review: bool,
  pub has_contradictions: bool,
  pub contradiction_details: Vec<Contradiction>,
  pub consolidated_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub embedding: Option<Vec<f32>>,
  #[serde(default)]
  pub embedding_text_hash: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ConsolidatedEntity {
  /// Standalone state of a freshly extracted entity: one source interview,
  /// not yet consolidated.
  #[must_use]
  pub fn from_extracted(
    extracted: &ExtractedEntity,
    entity_type: EntityType,
    id: Uuid,
    interview_id: &str,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      entity_type,
      name: extracted.name.clone(),
      description: extracted.description.clone(),
      attributes: extracted.attributes.clone(),
      company: extracted.company.clone(),
      business_unit: extracted.business_unit.clone(),
      department: extracted.department.clone(),
      mentioned_in_interviews: vec![interview_id.to_owned()],
      source_count: 1,
      first_mentioned_at: now,
      last_mentioned_at: now,
      merged_entity_ids: Vec::new(),
      is_consolidated: false,
      consensus_confidence: 0.0,
      needs_review: true,
      has_contradictions: false,
      contradiction_details: Vec::new(),
      consolidated_at: None,
      embedding: None,
      embedding_text_hash: None,
      created_at: now,
    }
  }
}

// ──────────────────────────────────────────────────
// Relationships
// ──────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  ToSchema,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
  Causes,
  Uses,
  Measures,
  Addresses,
}

/// Typed directed edge between two entities, discovered from co-occurrence
/// within a single interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Relationship {
  pub id: Uuid,
  pub source_entity_id: Uuid,
  pub source_entity_type: EntityType,
  pub target_entity_id: Uuid,
  pub target_entity_type: EntityType,
  pub relationship_type: RelationshipType,
  pub strength: f64,
  pub mentioned_in_interviews: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ──────────────────────────────────────────────────
// Patterns
// ──────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  ToSchema,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
  RecurringPain,
  ProblematicSystem,
}

/// Store-wide finding derived from aggregate provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Pattern {
  pub id: Uuid,
  pub pattern_type: PatternType,
  pub entity_type: EntityType,
  pub entity_id: Uuid,
  pub pattern_frequency: f64,
  pub source_count: u32,
  pub high_priority: bool,
  pub description: String,
  pub detected_at: DateTime<Utc>,
}

// ──────────────────────────────────────────────────
// Audit trail
// ──────────────────────────────────────────────────

/// Append-only log entry identifying which entities were merged into which,
/// with enough provenance to reverse the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
  pub id: Uuid,
  pub entity_type: EntityType,
  pub merged_entity_ids: Vec<Uuid>,
  pub resulting_entity_id: Uuid,
  pub similarity_score: f64,
  pub consolidated_at: DateTime<Utc>,
  pub rolled_back_at: Option<DateTime<Utc>>,
  pub rollback_reason: Option<String>,
}

/// Pre-merge serialized entity state captured so that rollback can restore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntitySnapshot {
  pub id: Uuid,
  pub audit_id: Uuid,
  pub entity_type: EntityType,
  pub entity_id: Uuid,
  #[schema(value_type = Object)]
  pub entity_state: serde_json::Value,
  pub created_at: DateTime<Utc>,
}
