use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DbBackend, Statement};

#[derive(DeriveMigrationName)]
pub struct Migration;

const TABLES: [&str; 2] = ["repositories", "pipeline_runs"];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute(Statement::from_string(
            DbBackend::Postgres,
            r#"
            CREATE OR REPLACE FUNCTION update_updated_at_column()
            RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = now();
                RETURN NEW;
            END;
            $$ language 'plpgsql';
            "#
            .to_string(),
        ))
        .await?;

        for table in TABLES {
            db.execute(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    "CREATE TRIGGER update_{}_updated_at BEFORE UPDATE ON {} \
                     FOR EACH ROW EXECUTE FUNCTION update_updated_at_column()",
                    table, table
                ),
            ))
            .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        for table in TABLES {
            db.execute(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    "DROP TRIGGER IF EXISTS update_{}_updated_at ON {}",
                    table, table
                ),
            ))
            .await?;
        }

        db.execute(Statement::from_string(
            DbBackend::Postgres,
            "DROP FUNCTION IF EXISTS update_updated_at_column()".to_string(),
        ))
        .await?;

        Ok(())
    }
}
