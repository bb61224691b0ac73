use sea_orm_migration::{
  prelude::*,
  schema::{
    boolean, custom, double, integer, json_binary, text, text_null, timestamp_with_time_zone,
    timestamp_with_time_zone_null, uuid,
  },
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
          .table(ConsolidatedEntities::Table)
          .if_not_exists()
          .col(uuid(ConsolidatedEntities::Id).primary_key())
          .col(text(ConsolidatedEntities::EntityType).not_null())
          .col(text(ConsolidatedEntities::Name).not_null())
          .col(text_null(ConsolidatedEntities::Description))
          .col(json_binary(ConsolidatedEntities::Attributes))
          .col(text_null(ConsolidatedEntities::Company))
          .col(text_null(ConsolidatedEntities::BusinessUnit))
          .col(text_null(ConsolidatedEntities::Department))
          .col(custom(ConsolidatedEntities::MentionedInInterviews, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(integer(ConsolidatedEntities::SourceCount).not_null().default(1))
          .col(timestamp_with_time_zone(ConsolidatedEntities::FirstMentionedAt).not_null().default(Expr::current_timestamp()))
          .col(timestamp_with_time_zone(ConsolidatedEntities::LastMentionedAt).not_null().default(Expr::current_timestamp()))
          .col(custom(ConsolidatedEntities::MergedEntityIds, "UUID[] NOT NULL DEFAULT '{}'"))
          .col(boolean(ConsolidatedEntities::IsConsolidated).not_null().default(false))
          .col(double(ConsolidatedEntities::ConsensusConfidence).not_null().default(0.0))
          .col(boolean(ConsolidatedEntities::NeedsReview).not_null().default(true))
          .col(boolean(ConsolidatedEntities::HasContradictions).not_null().default(false))
          .col(json_binary(ConsolidatedEntities::ContradictionDetails))
          .col(timestamp_with_time_zone_null(ConsolidatedEntities::ConsolidatedAt))
          .col(custom(ConsolidatedEntities::Embedding, "vector(1024)"))
          .col(text_null(ConsolidatedEntities::EmbeddingTextHash))
          .col(timestamp_with_time_zone(ConsolidatedEntities::CreatedAt).not_null().default(Expr::current_timestamp()))
          .to_owned(),
      )
      .await?;

    // Per-type lookup indexes driving duplicate detection and pattern scans
    for sql in [
      "CREATE INDEX idx_consolidated_entities_type_name ON consolidated_entities (entity_type, name);",
      "CREATE INDEX idx_consolidated_entities_type_source_count ON consolidated_entities (entity_type, source_count);",
      "CREATE INDEX idx_consolidated_entities_type_confidence ON consolidated_entities (entity_type, consensus_confidence);",
      "CREATE INDEX idx_consolidated_entities_type_consolidated ON consolidated_entities (entity_type, is_consolidated);",
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
      .drop_table(Table::drop().table(ConsolidatedEntities::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum ConsolidatedEntities {
  Table,

  Id,                    // uuid v7
  EntityType,            // closed tag set, e.g. "system", "pain_point"
  Name,                  // Spanish, accents preserved
  Description,
  Attributes,            // jsonb map name -> string | number | list
  Company,
  BusinessUnit,
  Department,
  MentionedInInterviews, // interview ids, insertion-ordered, deduplicated (TEXT[])
  SourceCount,           // == cardinality of mentioned_in_interviews
  FirstMentionedAt,
  LastMentionedAt,
  MergedEntityIds,       // original entity ids absorbed by this row (UUID[])
  IsConsolidated,        // true once at least one merge was absorbed
  ConsensusConfidence,   // [0, 1]
  NeedsReview,           // consensus_confidence < 0.6
  HasContradictions,
  ContradictionDetails,  // jsonb list of contradiction records
  ConsolidatedAt,        // last merge timestamp
  Embedding,             // cached vector(1024) for name + description
  EmbeddingTextHash,     // sha-256 of the text that produced the cached vector
  CreatedAt,
}
