use crate::Store;
use async_trait::async_trait;
use pac_cluster::{
    Cluster, ClusterError, LabelSelector, PipelineRun, PipelineRunPatch, Repository, Result,
};
use std::collections::BTreeMap;

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[async_trait]
impl Cluster for Store {
    async fn get_pipeline_run(&self, namespace: &str, name: &str) -> Result<PipelineRun> {
        self.pipeline_runs()
            .find(namespace, name)
            .await?
            .ok_or_else(|| ClusterError::not_found("PipelineRun", key(namespace, name)))
    }

    async fn list_pipeline_runs(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<PipelineRun>> {
        Ok(self.pipeline_runs().list(namespace, selector).await?)
    }

    async fn patch_pipeline_run(
        &self,
        namespace: &str,
        name: &str,
        patch: &PipelineRunPatch,
    ) -> Result<PipelineRun> {
        Ok(self.pipeline_runs().patch(namespace, name, patch).await?)
    }

    async fn delete_pipeline_run(&self, namespace: &str, name: &str) -> Result<()> {
        if self.pipeline_runs().delete(namespace, name).await? {
            Ok(())
        } else {
            Err(ClusterError::not_found("PipelineRun", key(namespace, name)))
        }
    }

    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository> {
        self.repositories()
            .find(namespace, name)
            .await?
            .ok_or_else(|| ClusterError::not_found("Repository", key(namespace, name)))
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        Ok(self.repositories().list().await?)
    }

    async fn update_repository_status(&self, repository: &Repository) -> Result<Repository> {
        Ok(self.repositories().update_status(repository).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        self.secrets()
            .find(namespace, name)
            .await?
            .ok_or_else(|| ClusterError::not_found("Secret", key(namespace, name)))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        if self.secrets().delete(namespace, name).await? {
            Ok(())
        } else {
            Err(ClusterError::not_found("Secret", key(namespace, name)))
        }
    }
}
