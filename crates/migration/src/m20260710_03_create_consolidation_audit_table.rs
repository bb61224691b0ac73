use sea_orm_migration::{
  prelude::*,
  schema::{custom, double, text, text_null, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
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
          .table(ConsolidationAudit::Table)
          .if_not_exists()
          .col(uuid(ConsolidationAudit::Id).primary_key())
          .col(text(ConsolidationAudit::EntityType).not_null())
          .col(custom(ConsolidationAudit::MergedEntityIds, "UUID[] NOT NULL DEFAULT '{}'"))
          .col(uuid(ConsolidationAudit::ResultingEntityId).not_null())
          .col(double(ConsolidationAudit::SimilarityScore).not_null())
          .col(timestamp_with_time_zone(ConsolidationAudit::ConsolidatedAt).not_null().default(Expr::current_timestamp()))
          .col(timestamp_with_time_zone_null(ConsolidationAudit::RolledBackAt))
          .col(text_null(ConsolidationAudit::RollbackReason))
          .to_owned(),
      )
      .await?;

    for sql in [
      "CREATE INDEX idx_consolidation_audit_entity_type ON consolidation_audit (entity_type);",
      "CREATE INDEX idx_consolidation_audit_consolidated_at ON consolidation_audit (consolidated_at);",
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
      .drop_table(Table::drop().table(ConsolidationAudit::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum ConsolidationAudit {
  Table,

  Id,                // uuid v7
  EntityType,
  MergedEntityIds,   // absorbed original ids (UUID[])
  ResultingEntityId, // the entity that absorbed them
  SimilarityScore,   // combined score that triggered the merge
  ConsolidatedAt,
  RolledBackAt,      // NULL = still reversible
  RollbackReason,
}
