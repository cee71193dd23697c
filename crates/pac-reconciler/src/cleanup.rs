use crate::Result;
use crate::reconciler::{Reconciler, ResolvedRepository, original_name};
use pac_cluster::{LabelSelector, PipelineRun};
use pac_config::keys;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Deletes the git auth secret of the finished run and prunes older runs
    /// of the same pipeline beyond the retention count.
    pub(crate) async fn cleanup(&self, resolved: &ResolvedRepository, run: &PipelineRun) -> Result<()> {
        self.delete_git_auth_secret(run).await;

        let Some(keep) = self
            .config
            .settings
            .effective_max_keep_runs(run.max_keep_runs())
        else {
            return Ok(());
        };
        let original = original_name(run);
        if original.is_empty() {
            debug!("PipelineRun {} has no original name, skipping cleanup", run.key());
            return Ok(());
        }

        let selector = LabelSelector::new()
            .with(keys::REPOSITORY, resolved.repository.name.as_str())
            .with(keys::ORIGINAL_PR_NAME, original)
            .with(keys::STATE, keys::STATE_COMPLETED);
        let mut siblings = self
            .cluster
            .list_pipeline_runs(Some(&run.namespace), &selector)
            .await?;
        siblings.sort_by(|a, b| b.status.completion_time.cmp(&a.status.completion_time));

        for (index, sibling) in siblings.iter().enumerate() {
            if !sibling.is_done() {
                info!("skipping {} since currently running", sibling.name);
                continue;
            }
            if index < keep {
                continue;
            }

            info!("cleaning old PipelineRun {}", sibling.key());
            match self
                .cluster
                .delete_pipeline_run(&sibling.namespace, &sibling.name)
                .await
            {
                Ok(()) => self.delete_git_auth_secret(sibling).await,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete_git_auth_secret(&self, run: &PipelineRun) {
        let Some(secret) = run
            .annotation(keys::GIT_AUTH_SECRET)
            .filter(|name| !name.is_empty())
        else {
            return;
        };
        match self.cluster.delete_secret(&run.namespace, secret).await {
            Ok(()) => debug!("deleted git auth secret {}/{}", run.namespace, secret),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(
                "failed to delete git auth secret {}/{}: {}",
                run.namespace, secret, e
            ),
        }
    }
}
