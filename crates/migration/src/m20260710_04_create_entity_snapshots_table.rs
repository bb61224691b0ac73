use sea_orm_migration::{
  prelude::*,
  schema::{json_binary, text, timestamp_with_time_zone, uuid},
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
          .table(EntitySnapshots::Table)
          .if_not_exists()
          .col(uuid(EntitySnapshots::Id).primary_key())
          .col(uuid(EntitySnapshots::AuditId).not_null())
          .col(text(EntitySnapshots::EntityType).not_null())
          .col(uuid(EntitySnapshots::EntityId).not_null())
          .col(json_binary(EntitySnapshots::EntityState))
          .col(timestamp_with_time_zone(EntitySnapshots::CreatedAt).not_null().default(Expr::current_timestamp()))
          .to_owned(),
      )
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_entity_snapshots_audit_id ON entity_snapshots (audit_id);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(EntitySnapshots::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum EntitySnapshots {
  Table,

  Id,          // uuid v7
  AuditId,     // consolidation_audit row this snapshot reverses
  EntityType,
  EntityId,    // entity whose pre-merge state is captured
  EntityState, // full serialized entity (jsonb)
  CreatedAt,
}
