use crate::workqueue::{Request, WorkQueue};
use crate::{ReconcileError, Result};
use chrono::Utc;
use pac_cluster::{Cluster, PipelineRun, PipelineRunPatch, Repository, RepositorySpec, State};
use pac_config::{ControllerInfo, Settings, constants, keys};
use pac_provider::{
    Conclusion, Credentials, Event, Provider, ProviderError, ProviderFactory, ProviderKind,
    RunStatus, StatusOpts, detect_provider,
};
use pac_sync::QueueManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub(crate) const REASON_RUNNING: &str = "Running";

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub settings: Settings,
    pub controller: ControllerInfo,
    /// Namespace holding the controller secret and the global repository.
    pub namespace: String,
    pub logs_dir: PathBuf,
    /// Delays between forge status attempts, one attempt per entry.
    pub status_backoff: Vec<Duration>,
    /// Deadline for a single reconcile.
    pub reconcile_timeout: Duration,
}

impl ReconcilerConfig {
    pub fn new(settings: Settings, controller: ControllerInfo, namespace: impl Into<String>) -> Self {
        Self {
            settings,
            controller,
            namespace: namespace.into(),
            logs_dir: PathBuf::from(constants::LOGS_DIR),
            status_backoff: constants::STATUS_BACKOFF_SCHEDULE.to_vec(),
            reconcile_timeout: constants::RECONCILE_TIMEOUT,
        }
    }
}

/// A repository and the settings it inherits from the global repository.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRepository {
    /// The repository as stored. Queues are always sized from this one.
    pub repository: Repository,
    pub spec: RepositorySpec,
    pub secret_namespace: String,
    pub controller: ControllerInfo,
}

pub struct Reconciler {
    pub(crate) cluster: Arc<dyn Cluster>,
    pub(crate) queues: Arc<QueueManager>,
    providers: Arc<dyn ProviderFactory>,
    pub(crate) work: WorkQueue,
    pub(crate) config: ReconcilerConfig,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn original_name(run: &PipelineRun) -> String {
    run.label(keys::ORIGINAL_PR_NAME)
        .or_else(|| run.annotation(keys::ORIGINAL_PR_NAME))
        .unwrap_or_default()
        .to_string()
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        queues: Arc<QueueManager>,
        providers: Arc<dyn ProviderFactory>,
        work: WorkQueue,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            cluster,
            queues,
            providers,
            work,
            config,
        }
    }

    pub fn work_queue(&self) -> &WorkQueue {
        &self.work
    }

    pub async fn handle(&self, request: &Request) -> Result<()> {
        match request {
            Request::Reconcile(key) => match self.cluster.get_pipeline_run_by_key(key).await {
                Ok(run) => self.reconcile(&run).await,
                Err(e) if e.is_not_found() => {
                    debug!("PipelineRun {} no longer exists", key);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            Request::Finalize(run) => self.finalize(run).await,
        }
    }

    pub async fn reconcile(&self, run: &PipelineRun) -> Result<()> {
        let state = run.state();
        if state.is_some_and(|s| s.is_terminal()) {
            return Ok(());
        }

        // Another actor started the run while the forge still shows it queued.
        if run.condition_reason() == Some(REASON_RUNNING) && state == Some(State::Queued) {
            let Some(resolved) = self.resolve_repository(run).await? else {
                return Ok(());
            };
            return self.update_to_in_progress(&resolved, run).await;
        }

        if run.annotations.contains_key(keys::INSTALLATION_ID)
            && !run.annotations.contains_key(keys::CHECK_RUN_ID)
        {
            debug!("Waiting for check run id on {}", run.key());
            return Ok(());
        }

        if state == Some(State::Queued) && run.is_pending() {
            return self.queue_pipeline_run(run).await;
        }

        if !run.is_done() && !run.is_cancelled() {
            return Ok(());
        }

        let latest = match self.cluster.get_pipeline_run(&run.namespace, &run.name).await {
            Ok(latest) => latest,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if latest.resource_version != run.resource_version {
            debug!("PipelineRun {} changed since it was read, skipping", run.key());
            return Ok(());
        }

        info!(
            "pipelineRun {} is done, reconciling to report status (sha {})",
            run.key(),
            run.label(keys::SHA).unwrap_or_default()
        );
        let (kind, event) = match detect_provider(run) {
            Ok(detected) => detected,
            Err(e) => {
                error!("detectProvider: {}", e);
                return Ok(());
            }
        };
        self.report_final_status(run, kind, event).await
    }

    /// Loads the repository named by the run. A repository that no longer
    /// exists drops its queue and yields `None`.
    pub(crate) async fn resolve_repository(
        &self,
        run: &PipelineRun,
    ) -> Result<Option<ResolvedRepository>> {
        let name = run
            .repository_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ReconcileError::MissingRepositoryAnnotation(run.key()))?;

        let repository = match self.cluster.get_repository(&run.namespace, name).await {
            Ok(repository) => repository,
            Err(e) if e.is_not_found() => {
                warn!(
                    "Repository {}/{} not found, removing its queue",
                    run.namespace, name
                );
                self.queues
                    .remove_repository(&format!("{}/{}", run.namespace, name));
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let controller = match run.annotation(keys::CONTROLLER_INFO) {
            Some(value) => ControllerInfo::from_annotation(value)?,
            None => self.config.controller.clone(),
        };

        let mut spec = repository.spec.clone();
        let mut secret_namespace = repository.namespace.clone();
        match self
            .cluster
            .get_repository(&self.config.namespace, &controller.global_repository)
            .await
        {
            Ok(global) if global.key() != repository.key() => {
                let local_needs_secret = spec
                    .git_provider
                    .as_ref()
                    .is_some_and(|provider| provider.secret.is_none());
                let global_has_secret = global
                    .spec
                    .git_provider
                    .as_ref()
                    .is_some_and(|provider| provider.secret.is_some());
                if local_needs_secret && global_has_secret {
                    secret_namespace = global.namespace.clone();
                }
                spec.merge(&global.spec);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(
                "Cannot read global repository {}: {}",
                controller.global_repository, e
            ),
        }

        Ok(Some(ResolvedRepository {
            repository,
            spec,
            secret_namespace,
            controller,
        }))
    }

    pub(crate) async fn queue_pipeline_run(&self, run: &PipelineRun) -> Result<()> {
        let Some(order) = run.execution_order() else {
            return Ok(());
        };
        let Some(resolved) = self.resolve_repository(run).await? else {
            return Ok(());
        };
        let repo = &resolved.repository;

        if !repo.is_throttled() {
            self.queues.remove_and_take_item_from_queue(repo, &run.key());
            return self.update_to_in_progress(&resolved, run).await;
        }

        let mut batch = Vec::new();
        for key in order {
            if key == run.key() {
                batch.push(key);
                continue;
            }
            match self.cluster.get_pipeline_run_by_key(&key).await {
                Ok(other) if other.is_pending() && other.state() == Some(State::Queued) => {
                    batch.push(key)
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => debug!("PipelineRun {} from batch is gone", key),
                Err(e) => return Err(e.into()),
            }
        }

        for _ in 0..constants::MAX_QUEUE_ITERATIONS {
            let mut acquired = self.queues.add_list_to_running_queue(repo, &batch)?;
            if acquired.is_empty() && self.queues.is_running(&repo.key(), &run.key()) {
                // Admitted earlier but never moved to started.
                acquired.push(run.key());
            }
            if acquired.is_empty() {
                info!(
                    "no new PipelineRun acquired for repo {}, {} still queued",
                    repo.key(),
                    run.key()
                );
                return Ok(());
            }

            let mut processed = false;
            for key in acquired {
                let next = match self.cluster.get_pipeline_run_by_key(&key).await {
                    Ok(next) => next,
                    Err(e) => {
                        error!("failed to get pipelineRun {}: {}", key, e);
                        self.queues.remove_from_queue(&repo.key(), &key);
                        continue;
                    }
                };
                if let Err(e) = self.update_to_in_progress(&resolved, &next).await {
                    error!("failed to update pipelineRun {} to in_progress: {}", key, e);
                    self.queues.remove_from_queue(&repo.key(), &key);
                    continue;
                }
                processed = true;
            }
            if processed {
                return Ok(());
            }
        }

        Err(ReconcileError::MaxIterationsExceeded {
            repository: repo.key(),
            iterations: constants::MAX_QUEUE_ITERATIONS,
        })
    }

    /// Moves the run to `started` and reports it to the forge. The forge
    /// status is best effort.
    pub(crate) async fn update_to_in_progress(
        &self,
        resolved: &ResolvedRepository,
        run: &PipelineRun,
    ) -> Result<()> {
        let mut patch = PipelineRunPatch::state(State::Started);
        patch.spec_status = Some(None);
        patch
            .annotations
            .insert(keys::STARTED_AT.to_string(), Utc::now().to_rfc3339());

        let started = match self
            .cluster
            .patch_pipeline_run(&run.namespace, &run.name, &patch)
            .await
        {
            Ok(started) => started,
            Err(e) => {
                let repo_key = resolved.repository.key();
                if e.is_not_found() {
                    self.queues.remove_from_queue(&repo_key, &run.key());
                } else {
                    self.queues.requeue_to_pending_by_key(&repo_key, &run.key());
                }
                return Err(e.into());
            }
        };
        info!("PipelineRun {} moved to started state", started.key());

        self.post_started_status(resolved, &started).await;
        Ok(())
    }

    async fn post_started_status(&self, resolved: &ResolvedRepository, run: &PipelineRun) {
        let (kind, event) = match detect_provider(run) {
            Ok(detected) => detected,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        let provider = match self.provider_for(kind, &event, resolved).await {
            Ok(provider) => provider,
            Err(e) => {
                error!("cannot set up {} client for {}: {}", kind, run.key(), e);
                return;
            }
        };

        let mut opts = self.status_opts(run, RunStatus::InProgress, Conclusion::Pending);
        opts.title = "CI has Started".to_string();
        opts.text = format!(
            "Starting PipelineRun <b>{}</b> in namespace <b>{}</b>",
            run.name, run.namespace
        );
        if let Some(url) = &opts.details_url {
            opts.text
                .push_str(&format!("<br><br>You can follow the execution [here]({})", url));
        }

        match self.post_with_retry(provider.as_ref(), &event, &opts).await {
            Ok(()) => info!(
                "updated in_progress status on provider platform for pipelineRun {}",
                run.name
            ),
            Err(e) => error!(
                "failed to report status to running on provider continuing! error: {}",
                e
            ),
        }
    }

    /// Releases `finished` and starts whichever run takes its slot. A
    /// successor that vanished frees its slot for the one after it.
    pub(crate) async fn advance_queue(&self, resolved: &ResolvedRepository, finished: &str) {
        let repo = &resolved.repository;
        let mut next = self.queues.remove_and_take_item_from_queue(repo, finished);
        while let Some(key) = next {
            match self.cluster.get_pipeline_run_by_key(&key).await {
                Ok(successor) => match self.update_to_in_progress(resolved, &successor).await {
                    Ok(()) => return,
                    Err(e) if e.is_not_found() => {
                        // update_to_in_progress already dropped it from the queue.
                        warn!(
                            "next PipelineRun {} was deleted before it started, trying the one after",
                            key
                        );
                        next = self.queues.take_next_item(repo);
                    }
                    Err(e) => {
                        error!("failed to start next PipelineRun {}: {}", key, e);
                        self.work.add_after(key, constants::RECONCILE_BASE_BACKOFF);
                        return;
                    }
                },
                Err(e) if e.is_not_found() => {
                    warn!("next PipelineRun {} no longer exists, trying the one after", key);
                    next = self.queues.remove_and_take_item_from_queue(repo, &key);
                }
                Err(e) => {
                    error!("cannot get pipeline for next in queue {}: {}", key, e);
                    self.queues.requeue_to_pending_by_key(&repo.key(), &key);
                    self.work.add_after(key, constants::RECONCILE_BASE_BACKOFF);
                    return;
                }
            }
        }
    }

    /// Enqueues runs that hold a running slot while the cluster still shows
    /// them queued, as left behind by a reconcile cut short between
    /// admission and the start patch. Returns how many were enqueued.
    pub async fn requeue_stalled_admissions(&self) -> usize {
        let mut requeued = 0;
        for snapshot in self.queues.snapshot() {
            for key in snapshot.running {
                match self.cluster.get_pipeline_run_by_key(&key).await {
                    Ok(run) if run.state() == Some(State::Queued) && run.is_pending() => {
                        warn!(
                            "PipelineRun {} holds a slot in {} but was never started, requeueing",
                            key, snapshot.repository
                        );
                        self.work.add(key).await;
                        requeued += 1;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => warn!("cannot check running PipelineRun {}: {}", key, e),
                }
            }
        }
        requeued
    }

    pub(crate) fn status_opts(
        &self,
        run: &PipelineRun,
        status: RunStatus,
        conclusion: Conclusion,
    ) -> StatusOpts {
        let mut opts = StatusOpts::new(status, conclusion);
        opts.details_url = self
            .config
            .settings
            .detail_url(&run.namespace, &run.name)
            .or_else(|| run.annotation(keys::LOG_URL).map(str::to_string));
        opts.pipeline_run_name = run.name.clone();
        opts.original_pipeline_run_name = original_name(run);
        opts.check_run_id = run
            .annotation(keys::CHECK_RUN_ID)
            .and_then(|id| id.trim().parse().ok());
        opts
    }

    pub(crate) async fn provider_for(
        &self,
        kind: ProviderKind,
        event: &Event,
        resolved: &ResolvedRepository,
    ) -> Result<Arc<dyn Provider>> {
        let credentials = self.credentials(event, resolved).await?;
        Ok(self
            .providers
            .build(kind, credentials, &self.config.settings.application_name)?)
    }

    /// Token for the forge. GitHub App runs use the controller secret, the
    /// rest the secret named by the repository's git provider.
    async fn credentials(&self, event: &Event, resolved: &ResolvedRepository) -> Result<Credentials> {
        let provider = resolved.spec.git_provider.clone().unwrap_or_default();
        let (namespace, name, key) = if event.installation_id.is_some() {
            (
                self.config.namespace.clone(),
                resolved.controller.secret.clone(),
                constants::DEFAULT_PROVIDER_TOKEN_KEY.to_string(),
            )
        } else {
            let secret = provider.secret.as_ref().ok_or_else(|| {
                ProviderError::MissingCredentials(format!(
                    "repository {}: no git provider secret",
                    resolved.repository.key()
                ))
            })?;
            let key = if secret.key.is_empty() {
                constants::DEFAULT_PROVIDER_TOKEN_KEY.to_string()
            } else {
                secret.key.clone()
            };
            (resolved.secret_namespace.clone(), secret.name.clone(), key)
        };

        let data = self.cluster.get_secret(&namespace, &name).await?;
        let token = data.get(&key).cloned().ok_or_else(|| {
            ProviderError::MissingCredentials(format!(
                "key {} in secret {}/{}",
                key, namespace, name
            ))
        })?;
        Ok(Credentials {
            token,
            user: non_empty(&provider.user),
            api_url: non_empty(&provider.url),
        })
    }

    pub(crate) async fn post_with_retry(
        &self,
        provider: &dyn Provider,
        event: &Event,
        opts: &StatusOpts,
    ) -> pac_provider::Result<()> {
        let attempts = self.config.status_backoff.len().max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match provider.create_status(event, opts).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if attempt >= attempts {
                return Err(err);
            }
            let delay = self
                .config
                .status_backoff
                .get(attempt - 1)
                .copied()
                .unwrap_or_default();
            warn!(
                "Failed to create status on {} (attempt {}/{}), retrying in {:?}: {}",
                provider.kind(),
                attempt,
                attempts,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}
