use sea_orm_migration::{
  prelude::*,
  schema::{boolean, double, integer, text, timestamp_with_time_zone, uuid},
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Patterns::Table)
          .if_not_exists()
          .col(uuid(Patterns::Id).primary_key())
          .col(text(Patterns::PatternType).not_null())
          .col(text(Patterns::EntityType).not_null())
          .col(uuid(Patterns::EntityId).not_null())
          .col(double(Patterns::PatternFrequency).not_null())
          .col(integer(Patterns::SourceCount).not_null())
          .col(boolean(Patterns::HighPriority).not_null().default(false))
          .col(text(Patterns::Description).not_null())
          .col(timestamp_with_time_zone(Patterns::DetectedAt).not_null().default(Expr::current_timestamp()))
          .to_owned(),
      )
      .await?;

    for sql in [
      "CREATE INDEX idx_patterns_pattern_type ON patterns (pattern_type);",
      "CREATE INDEX idx_patterns_high_priority ON patterns (high_priority);",
    ] {
      manager
        .get_connection()
        .execute_raw(Statement::from_string(manager.get_database_backend(), sql))
        .await?;
    }

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Patterns::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum Patterns {
  Table,

  Id,               // uuid v7
  PatternType,      // recurring_pain | problematic_system
  EntityType,
  EntityId,
  PatternFrequency, // source_count / total interviews
  SourceCount,
  HighPriority,
  Description,
  DetectedAt,
}
