use sea_orm::entity::prelude::*;

/// Append-only record of one merge decision. Rollback marks a row via
/// `rolled_back_at`; rows are never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "consolidation_audit")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub entity_type: String,
  pub merged_entity_ids: Vec<Uuid>,
  pub resulting_entity_id: Uuid,
  pub similarity_score: f64,
  pub consolidated_at: DateTimeWithTimeZone,
  pub rolled_back_at: Option<DateTimeWithTimeZone>,
  pub rollback_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
