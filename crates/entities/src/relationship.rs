use sea_orm::entity::prelude::*;

/// Directed edge between two consolidated entities, discovered from their
/// co-occurrence within a single interview.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "relationships")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub source_entity_id: Uuid,
  pub source_entity_type: String,
  pub target_entity_id: Uuid,
  pub target_entity_type: String,
  pub relationship_type: String,
  pub strength: f64,
  pub mentioned_in_interviews: Vec<String>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
