use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to resize semaphore for {repository} to {limit}")]
    ResizeFailed { repository: String, limit: i32 },

    #[error(transparent)]
    Cluster(#[from] pac_cluster::ClusterError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
