use sea_orm::entity::prelude::*;

/// Pre-merge serialized entity state, keyed by the audit record that made the
/// snapshot necessary.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "entity_snapshots")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub audit_id: Uuid,
  pub entity_type: String,
  pub entity_id: Uuid,
  pub entity_state: Json,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
