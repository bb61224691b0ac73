use sea_orm::entity::prelude::*;

/// One deduplicated business-intelligence entity.
///
/// `attributes` and `contradiction_details` are jsonb payloads owned by the
/// core domain types; the row stores them opaquely.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "consolidated_entities")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub entity_type: String,
  pub name: String,
  pub description: Option<String>,
  pub attributes: Json,
  pub company: Option<String>,
  pub business_unit: Option<String>,
  pub department: Option<String>,
  pub mentioned_in_interviews: Vec<String>,
  pub source_count: i32,
  pub first_mentioned_at: DateTimeWithTimeZone,
  pub last_mentioned_at: DateTimeWithTimeZone,
  pub merged_entity_ids: Vec<Uuid>,
  pub is_consolidated: bool,
  pub consensus_confidence: f64,
  pub needs_review: bool,
  pub has_contradictions: bool,
  pub contradiction_details: Json,
  pub consolidated_at: Option<DateTimeWithTimeZone>,
  pub embedding: Option<PgVector>,
  pub embedding_text_hash: Option<String>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
