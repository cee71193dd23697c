mod cluster;
pub mod error;
pub mod pipeline_runs;
pub mod repositories;
pub mod secrets;

pub use error::{Result, StoreError};

use sea_orm::DatabaseConnection;

pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn repositories(&self) -> repositories::RepoRepository<'_> {
        repositories::RepoRepository::new(&self.db)
    }

    pub fn pipeline_runs(&self) -> pipeline_runs::PipelineRunRepository<'_> {
        pipeline_runs::PipelineRunRepository::new(&self.db)
    }

    pub fn secrets(&self) -> secrets::SecretRepository<'_> {
        secrets::SecretRepository::new(&self.db)
    }
}
