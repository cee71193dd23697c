use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PipelineRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PipelineRuns::Namespace).text().not_null())
                    .col(ColumnDef::new(PipelineRuns::Name).text().not_null())
                    .col(ColumnDef::new(PipelineRuns::Repository).text())
                    .col(
                        ColumnDef::new(PipelineRuns::Labels)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::Annotations)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(PipelineRuns::SpecStatus).text())
                    .col(
                        ColumnDef::new(PipelineRuns::Status)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::CreationTime)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::ResourceVersion)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(PipelineRuns::Namespace)
                            .col(PipelineRuns::Name),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pipeline_runs_repository")
                    .table(PipelineRuns::Table)
                    .col(PipelineRuns::Namespace)
                    .col(PipelineRuns::Repository)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pipeline_runs_creation_time")
                    .table(PipelineRuns::Table)
                    .col(PipelineRuns::CreationTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PipelineRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PipelineRuns {
    Table,
    Namespace,
    Name,
    Repository,
    Labels,
    Annotations,
    SpecStatus,
    Status,
    CreationTime,
    ResourceVersion,
    UpdatedAt,
}
