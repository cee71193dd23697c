use crate::Result;
use crate::reconciler::{Reconciler, ResolvedRepository};
use pac_cluster::{PipelineRun, State};
use pac_provider::{Conclusion, RunStatus, detect_provider};
use tracing::{debug, error, info};

impl Reconciler {
    /// Handles a run that was deleted while queued or started: reports it as
    /// cancelled and hands its slot to the next run.
    pub async fn finalize(&self, run: &PipelineRun) -> Result<()> {
        if !matches!(run.state(), Some(State::Queued | State::Started)) {
            return Ok(());
        }
        if run.repository_name().is_none_or(str::is_empty) {
            debug!("deleted PipelineRun {} has no repository", run.key());
            return Ok(());
        }
        let Some(resolved) = self.resolve_repository(run).await? else {
            return Ok(());
        };

        if let Err(e) = self.report_cancelled(&resolved, run).await {
            error!("failed to report deleted PipelineRun {} as cancelled: {}", run.key(), e);
        }
        self.advance_queue(&resolved, &run.key()).await;
        Ok(())
    }

    async fn report_cancelled(&self, resolved: &ResolvedRepository, run: &PipelineRun) -> Result<()> {
        let (kind, event) = detect_provider(run)?;
        let provider = self.provider_for(kind, &event, resolved).await?;

        let mut opts = self.status_opts(run, RunStatus::Completed, Conclusion::Neutral);
        opts.title = "Cancelled".to_string();
        opts.text = format!("PipelineRun {} was deleted", run.name);
        self.post_with_retry(provider.as_ref(), &event, &opts).await?;

        info!("reported deleted PipelineRun {} as cancelled", run.key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use pac_cluster::State;
    use pac_provider::Conclusion;

    #[tokio::test]
    async fn test_deleted_running_run_frees_slot() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let gone = h.cluster.remove_pipeline_run("ns", "pr1").unwrap();
        h.reconciler.finalize(&gone).await.unwrap();

        assert_eq!(h.run("pr2").state(), Some(State::Started));
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr2"]);

        let cancelled = h
            .factory
            .calls()
            .into_iter()
            .find(|c| c.opts.pipeline_run_name == "pr1" && c.opts.title == "Cancelled")
            .unwrap();
        assert_eq!(cancelled.opts.conclusion, Conclusion::Neutral);
        assert_eq!(cancelled.opts.text, "PipelineRun pr1 was deleted");
    }

    #[tokio::test]
    async fn test_deleted_pending_run_leaves_queue() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let gone = h.cluster.remove_pipeline_run("ns", "pr2").unwrap();
        h.reconciler.finalize(&gone).await.unwrap();

        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr1"]);
        assert!(h.queues.queued_pipeline_runs("ns/repo").is_empty());
    }

    #[tokio::test]
    async fn test_completed_run_deletion_is_ignored() {
        let h = Harness::new(Some(1));
        let mut run = queued_run("pr1", &["pr1"]);
        run.annotations.insert(
            pac_config::keys::STATE.to_string(),
            pac_config::keys::STATE_COMPLETED.to_string(),
        );
        h.reconciler.finalize(&run).await.unwrap();
        assert!(h.factory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_run_of_removed_repository_drops_queue() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.remove_repository("ns", "repo");
        let gone = h.cluster.remove_pipeline_run("ns", "pr1").unwrap();
        h.reconciler.finalize(&gone).await.unwrap();
        assert!(h.queues.snapshot_for("ns/repo").is_none());
    }
}
