use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdmissionDrafts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdmissionDrafts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AdmissionDrafts::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(AdmissionDrafts::ApplicantName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AdmissionDrafts::GradeLevel).string().not_null())
                    .col(ColumnDef::new(AdmissionDrafts::ArtifactPath).string())
                    .col(
                        ColumnDef::new(AdmissionDrafts::ArtifactReadyAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(AdmissionDrafts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(AdmissionDrafts::Table)
                    .col(AdmissionDrafts::TenantId)
                    .name("idx_admission_drafts_tenant_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdmissionDrafts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AdmissionDrafts {
    Table,
    Id,
    TenantId,
    ApplicantName,
    GradeLevel,
    ArtifactPath,
    ArtifactReadyAt,
    CreatedAt,
}
