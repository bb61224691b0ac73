pub use sea_orm_migration::*;

mod m20260710_01_create_consolidated_entities_table;
mod m20260710_02_create_relationships_table;
mod m20260710_03_create_consolidation_audit_table;
mod m20260710_04_create_entity_snapshots_table;
mod m20260712_01_create_patterns_table;
mod m20260712_02_create_interviews_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260710_01_create_consolidated_entities_table::Migration),
      Box::new(m20260710_02_create_relationships_table::Migration),
      Box::new(m20260710_03_create_consolidation_audit_table::Migration),
      Box::new(m20260710_04_create_entity_snapshots_table::Migration),
      Box::new(m20260712_01_create_patterns_table::Migration),
      Box::new(m20260712_02_create_interviews_table::Migration),
    ]
  }
}
