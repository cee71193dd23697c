use crate::{
    ClusterError, LabelSelector, PipelineRun, PipelineRunPatch, Repository, Result, split_key,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Authoritative store of pipeline runs, repositories and secrets.
///
/// Every call may block on I/O. Callers must never hold a queue lock across one.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn get_pipeline_run(&self, namespace: &str, name: &str) -> Result<PipelineRun>;

    /// Lists runs matching `selector`, in every namespace when `namespace` is `None`.
    async fn list_pipeline_runs(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<PipelineRun>>;

    async fn patch_pipeline_run(
        &self,
        namespace: &str,
        name: &str,
        patch: &PipelineRunPatch,
    ) -> Result<PipelineRun>;

    async fn delete_pipeline_run(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository>;

    async fn list_repositories(&self) -> Result<Vec<Repository>>;

    /// Replaces the status list of `repository`. Fails with
    /// [`ClusterError::Conflict`] when its resource version is stale.
    async fn update_repository_status(&self, repository: &Repository) -> Result<Repository>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_pipeline_run_by_key(&self, key: &str) -> Result<PipelineRun> {
        let (namespace, name) =
            split_key(key).ok_or_else(|| ClusterError::InvalidKey(key.to_string()))?;
        self.get_pipeline_run(namespace, name).await
    }
}
