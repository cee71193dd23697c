use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Cluster(#[from] pac_cluster::ClusterError),

    #[error(transparent)]
    Sync(#[from] pac_sync::SyncError),

    #[error(transparent)]
    Provider(#[from] pac_provider::ProviderError),

    #[error("PipelineRun {0} has no repository annotation")]
    MissingRepositoryAnnotation(String),

    #[error("failed to parse controller info: {0}")]
    ControllerInfo(#[from] serde_json::Error),

    #[error("max iterations ({iterations}) reached while starting PipelineRuns for repository {repository}")]
    MaxIterationsExceeded {
        repository: String,
        iterations: usize,
    },

    #[error("reconcile of {0} timed out")]
    Timeout(String),
}

impl ReconcileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Cluster(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
