use pac_cluster::ClusterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("malformed stored document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("conflict updating {kind} {key}: resource version changed")]
    Conflict { kind: &'static str, key: String },
}

impl From<StoreError> for ClusterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => ClusterError::NotFound { kind, key },
            StoreError::Conflict { kind, key } => ClusterError::Conflict { kind, key },
            other => ClusterError::Transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
