//! In-memory [`Cluster`] used by tests and local runs.

use crate::{
    Cluster, ClusterError, LabelSelector, PipelineRun, PipelineRunPatch, Repository, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

type ObjectKey = (String, String);

#[derive(Default)]
struct Objects {
    pipeline_runs: BTreeMap<ObjectKey, PipelineRun>,
    repositories: BTreeMap<ObjectKey, Repository>,
    secrets: BTreeMap<ObjectKey, BTreeMap<String, String>>,
    next_version: i64,
}

impl Objects {
    fn bump(&mut self) -> i64 {
        self.next_version += 1;
        self.next_version
    }
}

#[derive(Default)]
struct Faults {
    patch: HashSet<String>,
    get: HashSet<String>,
    vanish_on_patch: HashSet<String>,
    stall_next_patch: HashSet<String>,
    repository_conflicts: usize,
}

#[derive(Default)]
pub struct MemoryCluster {
    objects: RwLock<Objects>,
    faults: RwLock<Faults>,
}

fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `run`, assigning it a fresh resource version.
    pub fn insert_pipeline_run(&self, mut run: PipelineRun) -> PipelineRun {
        let mut objects = self.objects.write();
        run.resource_version = objects.bump();
        objects
            .pipeline_runs
            .insert(object_key(&run.namespace, &run.name), run.clone());
        run
    }

    pub fn insert_repository(&self, mut repository: Repository) -> Repository {
        let mut objects = self.objects.write();
        repository.resource_version = objects.bump();
        objects.repositories.insert(
            object_key(&repository.namespace, &repository.name),
            repository.clone(),
        );
        repository
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.objects
            .write()
            .secrets
            .insert(object_key(namespace, name), data);
    }

    pub fn remove_repository(&self, namespace: &str, name: &str) {
        self.objects
            .write()
            .repositories
            .remove(&object_key(namespace, name));
    }

    pub fn remove_pipeline_run(&self, namespace: &str, name: &str) -> Option<PipelineRun> {
        self.objects
            .write()
            .pipeline_runs
            .remove(&object_key(namespace, name))
    }

    pub fn pipeline_run(&self, namespace: &str, name: &str) -> Option<PipelineRun> {
        self.objects
            .read()
            .pipeline_runs
            .get(&object_key(namespace, name))
            .cloned()
    }

    pub fn repository(&self, namespace: &str, name: &str) -> Option<Repository> {
        self.objects
            .read()
            .repositories
            .get(&object_key(namespace, name))
            .cloned()
    }

    pub fn has_secret(&self, namespace: &str, name: &str) -> bool {
        self.objects
            .read()
            .secrets
            .contains_key(&object_key(namespace, name))
    }

    pub fn pipeline_run_names(&self, namespace: &str) -> Vec<String> {
        self.objects
            .read()
            .pipeline_runs
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Makes every patch of the run `key` fail with a transient error.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_patches_for(&self, key: &str) {
        self.faults.write().patch.insert(key.to_string());
    }

    /// Makes every read of the run `key` fail with a transient error.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_gets_for(&self, key: &str) {
        self.faults.write().get.insert(key.to_string());
    }

    /// Rejects the next `count` repository status updates with a conflict.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject_repository_conflicts(&self, count: usize) {
        self.faults.write().repository_conflicts = count;
    }

    /// Deletes the run `key` when it is next patched, as if it was removed
    /// concurrently, so the patch fails with NotFound.
    #[cfg(any(test, feature = "test-util"))]
    pub fn vanish_on_patch(&self, key: &str) {
        self.faults.write().vanish_on_patch.insert(key.to_string());
    }

    /// The next patch of the run `key` never completes.
    #[cfg(any(test, feature = "test-util"))]
    pub fn stall_next_patch(&self, key: &str) {
        self.faults.write().stall_next_patch.insert(key.to_string());
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn get_pipeline_run(&self, namespace: &str, name: &str) -> Result<PipelineRun> {
        let key = format!("{}/{}", namespace, name);
        if self.faults.read().get.contains(&key) {
            return Err(ClusterError::Transient(format!("injected get failure for {}", key)));
        }
        self.pipeline_run(namespace, name)
            .ok_or_else(|| ClusterError::not_found("PipelineRun", key))
    }

    async fn list_pipeline_runs(
        &self,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<PipelineRun>> {
        Ok(self
            .objects
            .read()
            .pipeline_runs
            .values()
            .filter(|run| namespace.is_none_or(|ns| run.namespace == ns))
            .filter(|run| selector.matches(&run.labels))
            .cloned()
            .collect())
    }

    async fn patch_pipeline_run(
        &self,
        namespace: &str,
        name: &str,
        patch: &PipelineRunPatch,
    ) -> Result<PipelineRun> {
        let key = format!("{}/{}", namespace, name);
        let (vanish, stall) = {
            let mut faults = self.faults.write();
            if faults.patch.contains(&key) {
                return Err(ClusterError::Transient(format!(
                    "injected patch failure for {}",
                    key
                )));
            }
            (
                faults.vanish_on_patch.remove(&key),
                faults.stall_next_patch.remove(&key),
            )
        };
        if vanish {
            self.remove_pipeline_run(namespace, name);
        }
        if stall {
            std::future::pending::<()>().await;
        }

        let mut objects = self.objects.write();
        let version = objects.bump();
        let run = objects
            .pipeline_runs
            .get_mut(&object_key(namespace, name))
            .ok_or_else(|| ClusterError::not_found("PipelineRun", key))?;
        patch.apply(run);
        run.resource_version = version;
        Ok(run.clone())
    }

    async fn delete_pipeline_run(&self, namespace: &str, name: &str) -> Result<()> {
        self.remove_pipeline_run(namespace, name)
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("PipelineRun", format!("{}/{}", namespace, name)))
    }

    async fn get_repository(&self, namespace: &str, name: &str) -> Result<Repository> {
        self.repository(namespace, name).ok_or_else(|| {
            ClusterError::not_found("Repository", format!("{}/{}", namespace, name))
        })
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>> {
        Ok(self.objects.read().repositories.values().cloned().collect())
    }

    async fn update_repository_status(&self, repository: &Repository) -> Result<Repository> {
        {
            let mut faults = self.faults.write();
            if faults.repository_conflicts > 0 {
                faults.repository_conflicts -= 1;
                return Err(ClusterError::conflict("Repository", repository.key()));
            }
        }

        let mut objects = self.objects.write();
        let version = objects.bump();
        let stored = objects
            .repositories
            .get_mut(&object_key(&repository.namespace, &repository.name))
            .ok_or_else(|| ClusterError::not_found("Repository", repository.key()))?;
        if stored.resource_version != repository.resource_version {
            return Err(ClusterError::conflict("Repository", repository.key()));
        }
        stored.status = repository.status.clone();
        stored.resource_version = version;
        Ok(stored.clone())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        self.objects
            .read()
            .secrets
            .get(&object_key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::not_found("Secret", format!("{}/{}", namespace, name)))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.objects
            .write()
            .secrets
            .remove(&object_key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found("Secret", format!("{}/{}", namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RepositoryRunStatus, State};

    #[tokio::test]
    async fn test_patch_bumps_resource_version() {
        let cluster = MemoryCluster::new();
        let run = cluster.insert_pipeline_run(PipelineRun::new("ns", "pr1"));

        let patched = cluster
            .patch_pipeline_run("ns", "pr1", &PipelineRunPatch::state(State::Started))
            .await
            .unwrap();

        assert!(patched.resource_version > run.resource_version);
        assert_eq!(patched.state(), Some(State::Started));
    }

    #[tokio::test]
    async fn test_stale_repository_update_conflicts() {
        let cluster = MemoryCluster::new();
        let repo = cluster.insert_repository(Repository::new("ns", "repo"));

        let mut first = repo.clone();
        first.status.push(RepositoryRunStatus::default());
        cluster.update_repository_status(&first).await.unwrap();

        let err = cluster.update_repository_status(&repo).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let cluster = MemoryCluster::new();
        let mut run = PipelineRun::new("ns", "pr1");
        run.labels.insert("a".to_string(), "1".to_string());
        cluster.insert_pipeline_run(run);
        cluster.insert_pipeline_run(PipelineRun::new("other", "pr2"));

        let all = cluster
            .list_pipeline_runs(None, &LabelSelector::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let selected = cluster
            .list_pipeline_runs(Some("ns"), &LabelSelector::new().with("a", "1"))
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "pr1");

        let err = cluster.get_pipeline_run_by_key("missing").await.unwrap_err();
        assert_eq!(err, ClusterError::InvalidKey("missing".to_string()));
    }

    #[tokio::test]
    async fn test_vanish_on_patch_deletes_run() {
        let cluster = MemoryCluster::new();
        cluster.insert_pipeline_run(PipelineRun::new("ns", "pr1"));
        cluster.vanish_on_patch("ns/pr1");

        let err = cluster
            .patch_pipeline_run("ns", "pr1", &PipelineRunPatch::state(State::Started))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(cluster.pipeline_run("ns", "pr1").is_none());
    }
}
