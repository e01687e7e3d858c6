use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboxEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(OutboxEvents::Topic).string().not_null())
                    .col(
                        ColumnDef::new(OutboxEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::IdempotencyKey).string())
                    .col(
                        ColumnDef::new(OutboxEvents::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(ColumnDef::new(OutboxEvents::NextRunAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(OutboxEvents::ClaimedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(OutboxEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::ProcessedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(OutboxEvents::LastError).text())
                    .check(Expr::col(OutboxEvents::Status).is_in([
                        "pending",
                        "processing",
                        "processed",
                        "failed",
                        "dead",
                    ]))
                    .to_owned(),
            )
            .await?;

        // Enqueue dedup. NULL keys are distinct, so keyless events never collide.
        manager
            .create_index(
                Index::create()
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::TenantId)
                    .col(OutboxEvents::Topic)
                    .col(OutboxEvents::IdempotencyKey)
                    .unique()
                    .name("uq_outbox_events_tenant_topic_idempotency_key")
                    .to_owned(),
            )
            .await?;

        // Claim scan: eligible rows of one topic, oldest due first.
        manager
            .create_index(
                Index::create()
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::Topic)
                    .col(OutboxEvents::Status)
                    .col(OutboxEvents::NextRunAt)
                    .name("idx_outbox_events_topic_status_next_run_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OutboxEvents {
    Table,
    Id,
    TenantId,
    Topic,
    Payload,
    IdempotencyKey,
    Status,
    Attempts,
    MaxAttempts,
    NextRunAt,
    ClaimedAt,
    CreatedAt,
    ProcessedAt,
    LastError,
}
