use sea_orm::entity::prelude::*;

/// Store-wide finding (recurring pain, problematic system). Rows of a given
/// pattern_type are replaced wholesale on each scan.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "patterns")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub pattern_type: String,
  pub entity_type: String,
  pub entity_id: Uuid,
  pub pattern_frequency: f64,
  pub source_count: i32,
  pub high_priority: bool,
  pub description: String,
  pub detected_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
