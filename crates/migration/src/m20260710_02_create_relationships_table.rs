use sea_orm_migration::{
  prelude::*,
  schema::{custom, double, text, timestamp_with_time_zone, uuid},
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
          .table(Relationships::Table)
          .if_not_exists()
          .col(uuid(Relationships::Id).primary_key())
          .col(uuid(Relationships::SourceEntityId).not_null())
          .col(text(Relationships::SourceEntityType).not_null())
          .col(uuid(Relationships::TargetEntityId).not_null())
          .col(text(Relationships::TargetEntityType).not_null())
          .col(text(Relationships::RelationshipType).not_null())
          .col(double(Relationships::Strength).not_null())
          .col(custom(Relationships::MentionedInInterviews, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(timestamp_with_time_zone(Relationships::CreatedAt).not_null().default(Expr::current_timestamp()))
          .col(timestamp_with_time_zone(Relationships::UpdatedAt).not_null().default(Expr::current_timestamp()))
          .to_owned(),
      )
      .await?;

    for sql in [
      "CREATE INDEX idx_relationships_source ON relationships (source_entity_id, source_entity_type);",
      "CREATE INDEX idx_relationships_target ON relationships (target_entity_id, target_entity_type);",
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
      .drop_table(Table::drop().table(Relationships::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum Relationships {
  Table,

  Id,                    // uuid v7
  SourceEntityId,
  SourceEntityType,
  TargetEntityId,
  TargetEntityType,
  RelationshipType,      // causes | uses | measures | addresses
  Strength,              // [0, 1], monotonically non-decreasing
  MentionedInInterviews, // interview ids where the edge was observed (TEXT[])
  CreatedAt,
  UpdatedAt,
}
