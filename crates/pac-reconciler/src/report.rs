use crate::Result;
use crate::log_snippet::task_status_text;
use crate::reconciler::Reconciler;
use chrono::Utc;
use pac_cluster::{ConditionStatus, PipelineRun, PipelineRunPatch, Repository, RepositoryRunStatus, State};
use pac_config::constants;
use pac_provider::{Conclusion, Event, Provider, ProviderKind, RunStatus};
use tracing::{debug, error, info};

const CANCELLED_REASONS: [&str; 3] = ["Cancelled", "CancelledRunFinally", "StoppedRunFinally"];

/// Maps the run's `Succeeded` condition to the conclusion shown on the forge.
pub fn conclusion_for(run: &PipelineRun) -> Conclusion {
    let condition = match run.succeeded_condition() {
        Some(condition) if condition.status != ConditionStatus::Unknown => condition,
        _ if run.is_cancelled() => return Conclusion::Neutral,
        _ => return Conclusion::Pending,
    };
    match condition.status {
        ConditionStatus::True => Conclusion::Success,
        ConditionStatus::False if CANCELLED_REASONS.contains(&condition.reason.as_str()) => {
            if run.status.start_time.is_none() {
                Conclusion::Skipped
            } else {
                Conclusion::Neutral
            }
        }
        _ => Conclusion::Failure,
    }
}

fn target_branch(event: &Event) -> Option<String> {
    let branch = event
        .base_branch
        .trim_start_matches("refs/heads/")
        .trim_start_matches("refs/tags/");
    (!branch.is_empty()).then(|| branch.to_string())
}

impl Reconciler {
    pub(crate) async fn report_final_status(
        &self,
        run: &PipelineRun,
        kind: ProviderKind,
        event: Event,
    ) -> Result<()> {
        let Some(resolved) = self.resolve_repository(run).await? else {
            return Ok(());
        };

        let posted = match self.provider_for(kind, &event, &resolved).await {
            Ok(provider) => self
                .post_final_status(provider.as_ref(), &event, run)
                .await
                .map_err(Into::into),
            Err(e) => Err(e),
        };
        let final_state = match posted {
            Ok(()) => State::Completed,
            Err(e) => {
                error!("failed to post final status, moving on: {}", e);
                State::Failed
            }
        };

        self.update_repository_status(&resolved.repository, run, &event)
            .await;

        match self
            .cluster
            .patch_pipeline_run(&run.namespace, &run.name, &PipelineRunPatch::state(final_state))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("PipelineRun {} deleted before its state was recorded", run.key())
            }
            Err(e) => return Err(e.into()),
        }

        self.advance_queue(&resolved, &run.key()).await;
        self.cleanup(&resolved, run).await
    }

    async fn post_final_status(
        &self,
        provider: &dyn Provider,
        event: &Event,
        run: &PipelineRun,
    ) -> pac_provider::Result<()> {
        let conclusion = conclusion_for(run);
        let logs_dir = self
            .config
            .settings
            .error_log_snippet
            .then_some(self.config.logs_dir.as_path());

        let mut opts = self.status_opts(run, RunStatus::Completed, conclusion);
        opts.text = task_status_text(run, logs_dir).await;

        let result = self.post_with_retry(provider, event, &opts).await;
        info!("pipelinerun {} has a status of '{}'", run.name, conclusion);
        result
    }

    /// Records the run in the repository's history, re-reading the repository
    /// on every conflict. Gives up with an error log.
    pub(crate) async fn update_repository_status(
        &self,
        repo: &Repository,
        run: &PipelineRun,
        event: &Event,
    ) {
        let entry = RepositoryRunStatus {
            pipeline_run_name: run.name.clone(),
            conditions: run.status.conditions.clone(),
            start_time: run.status.start_time,
            completion_time: run.status.completion_time.or_else(|| Some(Utc::now())),
            sha: (!event.sha.is_empty()).then(|| event.sha.clone()),
            sha_url: (!event.sha_url.is_empty()).then(|| event.sha_url.clone()),
            title: (!event.sha_title.is_empty()).then(|| event.sha_title.clone()),
            log_url: self.config.settings.detail_url(&run.namespace, &run.name),
            event_type: (!event.event_type.is_empty()).then(|| event.event_type.clone()),
            target_branch: target_branch(event),
        };

        for attempt in 1..=constants::MAX_REPOSITORY_STATUS_RETRIES {
            let mut latest = match self.cluster.get_repository(&repo.namespace, &repo.name).await {
                Ok(latest) => latest,
                Err(e) => {
                    error!("cannot read repository {} to record status: {}", repo.key(), e);
                    return;
                }
            };
            latest.push_run_status(entry.clone(), constants::MAX_REPOSITORY_STATUS_ENTRIES);
            match self.cluster.update_repository_status(&latest).await {
                Ok(updated) => {
                    info!(
                        "repository status of {} has been updated with {}",
                        updated.key(),
                        run.name
                    );
                    return;
                }
                Err(e) => info!(
                    "could not update repository {}, retrying {}/{}: {}",
                    repo.key(),
                    attempt,
                    constants::MAX_REPOSITORY_STATUS_RETRIES,
                    e
                ),
            }
        }
        error!(
            "cannot update status of repository {} after {} attempts",
            repo.key(),
            constants::MAX_REPOSITORY_STATUS_RETRIES
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Duration;
    use pac_cluster::{Condition, SpecStatus};
    use pac_config::keys;

    #[test]
    fn test_conclusion_for() {
        let mut run = PipelineRun::new("ns", "pr");
        assert_eq!(conclusion_for(&run), Conclusion::Pending);

        run.status.conditions = vec![Condition::succeeded(ConditionStatus::True, "Succeeded")];
        assert_eq!(conclusion_for(&run), Conclusion::Success);

        run.status.conditions = vec![Condition::succeeded(ConditionStatus::False, "Failed")];
        assert_eq!(conclusion_for(&run), Conclusion::Failure);

        run.status.conditions = vec![Condition::succeeded(ConditionStatus::False, "Cancelled")];
        assert_eq!(conclusion_for(&run), Conclusion::Skipped);

        run.status.start_time = Some(Utc::now());
        assert_eq!(conclusion_for(&run), Conclusion::Neutral);

        run.status.conditions.clear();
        run.spec_status = Some(SpecStatus::Cancelled);
        assert_eq!(conclusion_for(&run), Conclusion::Neutral);
    }

    #[test]
    fn test_target_branch_strips_ref_prefix() {
        let event = Event {
            base_branch: "refs/heads/main".to_string(),
            ..Default::default()
        };
        assert_eq!(target_branch(&event).as_deref(), Some("main"));
        assert_eq!(target_branch(&Event::default()), None);
    }

    #[tokio::test]
    async fn test_completion_advances_queue() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        assert_eq!(h.run("pr1").state(), Some(State::Completed));
        assert_eq!(h.run("pr2").state(), Some(State::Started));
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr2"]);
        assert!(h.queues.queued_pipeline_runs("ns/repo").is_empty());

        let calls = h.factory.calls();
        let final_call = calls
            .iter()
            .find(|c| c.opts.status == RunStatus::Completed)
            .unwrap();
        assert_eq!(final_call.opts.conclusion, Conclusion::Success);
        assert_eq!(final_call.opts.pipeline_run_name, "pr1");

        let repo = h.cluster.repository("ns", "repo").unwrap();
        assert_eq!(repo.status.len(), 1);
        assert_eq!(repo.status[0].pipeline_run_name, "pr1");
        assert_eq!(repo.status[0].sha.as_deref(), Some("abc123"));
        assert_eq!(repo.status[0].target_branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_final_status_failure_marks_run_failed() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.factory.fail_all(true);
        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        assert_eq!(h.run("pr1").state(), Some(State::Failed));
        assert!(h.queues.running_pipeline_runs("ns/repo").is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_still_releases_slot() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.insert_secret("ns", "repo-token", Default::default());
        let done = h.finish("pr1", ConditionStatus::False, "Failed");
        h.reconciler.reconcile(&done).await.unwrap();

        assert_eq!(h.run("pr1").state(), Some(State::Failed));
        assert_eq!(h.run("pr2").state(), Some(State::Started));
    }

    #[tokio::test]
    async fn test_vanished_successor_is_skipped() {
        let h = Harness::new(Some(1));
        let pr1 = h
            .cluster
            .insert_pipeline_run(queued_run("pr1", &["pr1", "pr2", "pr3"]));
        h.cluster
            .insert_pipeline_run(queued_run("pr2", &["pr1", "pr2", "pr3"]));
        h.cluster
            .insert_pipeline_run(queued_run("pr3", &["pr1", "pr2", "pr3"]));
        h.reconciler.reconcile(&pr1).await.unwrap();
        assert_eq!(
            h.queues.queued_pipeline_runs("ns/repo"),
            vec!["ns/pr2", "ns/pr3"]
        );

        h.cluster.remove_pipeline_run("ns", "pr2");
        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        assert_eq!(h.run("pr3").state(), Some(State::Started));
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr3"]);
    }

    #[tokio::test]
    async fn test_successor_deleted_during_start_hands_slot_on() {
        let h = Harness::new(Some(1));
        let order = ["pr1", "pr2", "pr3"];
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &order));
        let pr2 = h.cluster.insert_pipeline_run(queued_run("pr2", &order));
        h.cluster.insert_pipeline_run(queued_run("pr3", &order));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.vanish_on_patch("ns/pr2");
        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        assert!(h.cluster.pipeline_run("ns", "pr2").is_none());
        assert_eq!(h.run("pr3").state(), Some(State::Started));
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr3"]);
        assert!(h.queues.queued_pipeline_runs("ns/repo").is_empty());

        h.reconciler.finalize(&pr2).await.unwrap();
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr3"]);
    }

    #[tokio::test]
    async fn test_unreadable_successor_goes_back_to_pending() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.fail_gets_for("ns/pr2");
        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        assert!(h.queues.running_pipeline_runs("ns/repo").is_empty());
        assert_eq!(h.queues.queued_pipeline_runs("ns/repo"), vec!["ns/pr2"]);
    }

    #[tokio::test]
    async fn test_stale_run_is_not_reported() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let mut stale = h.finish("pr1", ConditionStatus::True, "Succeeded");
        stale.resource_version -= 1;
        h.reconciler.reconcile(&stale).await.unwrap();

        assert_eq!(h.run("pr1").state(), Some(State::Started));
    }

    #[tokio::test]
    async fn test_repository_status_survives_conflicts() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.inject_repository_conflicts(3);
        let done = h.finish("pr1", ConditionStatus::True, "Succeeded");
        h.reconciler.reconcile(&done).await.unwrap();

        let repo = h.cluster.repository("ns", "repo").unwrap();
        assert_eq!(repo.status.len(), 1);
    }

    #[tokio::test]
    async fn test_error_snippet_included_in_final_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = Harness::new(Some(1));
        h.reconciler.config.logs_dir = dir.path().to_path_buf();

        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let task_dir = dir.path().join("ns").join("pr1");
        tokio::fs::create_dir_all(&task_dir).await.unwrap();
        tokio::fs::write(task_dir.join("lint.log"), "error: unused import\n")
            .await
            .unwrap();

        let mut run = h.cluster.pipeline_run("ns", "pr1").unwrap();
        run.status.conditions = vec![Condition::succeeded(ConditionStatus::False, "Failed")];
        run.status.start_time = Some(Utc::now() - Duration::minutes(1));
        run.status.completion_time = Some(Utc::now());
        run.status.child_statuses = vec![pac_cluster::ChildStatus {
            name: "pr1-lint".to_string(),
            pipeline_task_name: "lint".to_string(),
            condition: Some(Condition::succeeded(ConditionStatus::False, "Failed")),
        }];
        let done = h.cluster.insert_pipeline_run(run);
        h.reconciler.reconcile(&done).await.unwrap();

        let calls = h.factory.calls();
        let final_call = calls.last().unwrap();
        assert_eq!(final_call.opts.conclusion, Conclusion::Failure);
        assert!(final_call.opts.text.contains("error: unused import"));
        assert_eq!(
            h.run("pr1").annotation(keys::STATE),
            Some(keys::STATE_COMPLETED)
        );
    }
}
