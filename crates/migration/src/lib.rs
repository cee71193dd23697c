pub use sea_orm_migration::prelude::*;

mod m20261016_120000_create_repositories;
mod m20261016_120010_create_pipeline_runs;
mod m20261016_120020_create_secrets;
mod m20261016_120030_create_triggers;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261016_120000_create_repositories::Migration),
            Box::new(m20261016_120010_create_pipeline_runs::Migration),
            Box::new(m20261016_120020_create_secrets::Migration),
            Box::new(m20261016_120030_create_triggers::Migration),
        ]
    }
}
