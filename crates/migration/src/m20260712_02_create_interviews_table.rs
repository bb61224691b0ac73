use sea_orm_migration::{
  prelude::*,
  schema::{text, timestamp_with_time_zone},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Interviews::Table)
          .if_not_exists()
          .col(text(Interviews::Id).primary_key())
          .col(timestamp_with_time_zone(Interviews::FirstSeenAt).not_null().default(Expr::current_timestamp()))
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Interviews::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
pub enum Interviews {
  Table,
  // opaque interview identifier from the extraction pipeline
  Id,
  FirstSeenAt,
}
