use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("conflict updating {kind} {key}: resource version changed")]
    Conflict { kind: &'static str, key: String },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("cluster request failed: {0}")]
    Transient(String),
}

impl ClusterError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        ClusterError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn conflict(kind: &'static str, key: impl Into<String>) -> Self {
        ClusterError::Conflict {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
