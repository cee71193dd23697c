use crate::{Result, Semaphore, SyncError};
use chrono::Utc;
use pac_cluster::{Cluster, LabelSelector, PipelineRun, Repository, SpecStatus, State};
use pac_config::keys;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, info, warn};

/// Point-in-time view of one repository queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub repository: String,
    pub limit: usize,
    pub running: Vec<String>,
    pub pending: Vec<String>,
}

/// Owns one [`Semaphore`] per repository.
///
/// The map lock is never held while a semaphore is called.
#[derive(Debug, Default)]
pub struct QueueManager {
    queues: Mutex<HashMap<String, Arc<Semaphore>>>,
    clock: AtomicI64,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly increasing nanosecond timestamp used as enqueue priority.
    fn next_priority(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// Returns the semaphore for `repo`, creating it or resizing it to the
    /// repository's current limit.
    pub fn get_semaphore(&self, repo: &Repository) -> Result<Arc<Semaphore>> {
        let key = repo.key();
        let limit = repo.concurrency_limit();

        let sema = {
            let mut queues = self.queues.lock();
            queues
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!("Creating queue for repository {} with limit {}", key, limit);
                    Arc::new(Semaphore::new(key.clone(), usize::try_from(limit).unwrap_or(0)))
                })
                .clone()
        };

        if usize::try_from(limit).ok() != Some(sema.limit()) {
            if !sema.resize(limit) {
                return Err(SyncError::ResizeFailed {
                    repository: key,
                    limit,
                });
            }
            info!("Resized queue for repository {} to {}", key, limit);
        }
        Ok(sema)
    }

    fn find(&self, repo_key: &str) -> Option<Arc<Semaphore>> {
        self.queues.lock().get(repo_key).cloned()
    }

    /// Enqueues `keys` in order and admits as many as the limit allows.
    /// Returns the keys that started running. An unthrottled repository
    /// returns its whole pending set.
    pub fn add_list_to_running_queue(&self, repo: &Repository, keys: &[String]) -> Result<Vec<String>> {
        let sema = self.get_semaphore(repo)?;
        for key in keys {
            if sema.add_to_queue(key, self.next_priority()) {
                info!(
                    "added pipelineRun ({}) to running queue for repository ({})",
                    key,
                    repo.key()
                );
            }
        }

        if !repo.is_throttled() {
            return Ok(sema.current_pending());
        }

        let mut started = Vec::new();
        for _ in 0..repo.concurrency_limit() {
            if let Some(acquired) = sema.acquire_latest() {
                info!("moved ({}) to running for repository ({})", acquired, repo.key());
                started.push(acquired);
            }
        }
        Ok(started)
    }

    pub fn add_to_pending_queue(&self, repo: &Repository, keys: &[String]) -> Result<()> {
        let sema = self.get_semaphore(repo)?;
        for key in keys {
            if sema.add_to_pending_queue(key, self.next_priority()) {
                info!(
                    "added pipelineRun ({}) to pending queue for repository ({})",
                    key,
                    repo.key()
                );
            }
        }
        Ok(())
    }

    fn restore_running(&self, repo: &Repository, keys: &[String]) -> Result<()> {
        let sema = self.get_semaphore(repo)?;
        for key in keys {
            if sema.add_to_running(key, self.next_priority()) {
                debug!("restored ({}) as running for repository ({})", key, repo.key());
            }
        }
        Ok(())
    }

    /// Removes `pr_key` from the queue of `repo` and admits the next pending
    /// key, if any, in the same critical section.
    pub fn remove_and_take_item_from_queue(&self, repo: &Repository, pr_key: &str) -> Option<String> {
        let sema = match self.get_semaphore(repo) {
            Ok(sema) => sema,
            Err(e) => {
                warn!("Failed to get queue for repository {}: {}", repo.key(), e);
                return None;
            }
        };

        let (removed, next) = sema.release_and_acquire_next(pr_key);
        if removed {
            info!("removed ({}) from queue for repository ({})", pr_key, repo.key());
        }
        if let Some(next) = &next {
            info!("moved ({}) to running for repository ({})", next, repo.key());
        }
        next
    }

    /// Admits the head of the pending queue of `repo` if a slot is free.
    pub fn take_next_item(&self, repo: &Repository) -> Option<String> {
        let sema = match self.get_semaphore(repo) {
            Ok(sema) => sema,
            Err(e) => {
                warn!("Failed to get queue for repository {}: {}", repo.key(), e);
                return None;
            }
        };
        let next = sema.acquire_latest();
        if let Some(next) = &next {
            info!("moved ({}) to running for repository ({})", next, repo.key());
        }
        next
    }

    /// Drops `pr_key` without admitting a successor. Returns whether the key
    /// was running or pending.
    pub fn remove_from_queue(&self, repo_key: &str, pr_key: &str) -> bool {
        let Some(sema) = self.find(repo_key) else {
            return false;
        };
        let present = sema.remove_from_queue(pr_key);
        if present {
            info!("removed ({}) from queue for repository ({})", pr_key, repo_key);
        }
        present
    }

    pub fn requeue_to_pending(&self, repo: &Repository, run: &PipelineRun) -> bool {
        self.requeue_to_pending_by_key(&repo.key(), &run.key())
    }

    /// Moves a running key back to pending at the position it was admitted from.
    pub fn requeue_to_pending_by_key(&self, repo_key: &str, pr_key: &str) -> bool {
        let Some(sema) = self.find(repo_key) else {
            return false;
        };
        let requeued = sema.requeue_to_pending(pr_key, None);
        if requeued {
            info!("requeued ({}) to pending for repository ({})", pr_key, repo_key);
        }
        requeued
    }

    pub fn remove_repository(&self, repo_key: &str) {
        if self.queues.lock().remove(repo_key).is_some() {
            info!("removed queue for repository {}", repo_key);
        }
    }

    pub fn running_pipeline_runs(&self, repo_key: &str) -> Vec<String> {
        self.find(repo_key)
            .map(|sema| sema.current_running())
            .unwrap_or_default()
    }

    pub fn queued_pipeline_runs(&self, repo_key: &str) -> Vec<String> {
        self.find(repo_key)
            .map(|sema| sema.current_pending())
            .unwrap_or_default()
    }

    pub fn is_running(&self, repo_key: &str, pr_key: &str) -> bool {
        self.find(repo_key)
            .is_some_and(|sema| sema.is_running(pr_key))
    }

    pub(crate) fn semaphores(&self) -> Vec<Arc<Semaphore>> {
        let mut semaphores: Vec<Arc<Semaphore>> = self.queues.lock().values().cloned().collect();
        semaphores.sort_by(|a, b| a.name().cmp(b.name()));
        semaphores
    }

    pub fn snapshot_for(&self, repo_key: &str) -> Option<QueueSnapshot> {
        self.find(repo_key).map(|sema| snapshot_of(&sema))
    }

    pub fn snapshot(&self) -> Vec<QueueSnapshot> {
        self.semaphores().iter().map(|sema| snapshot_of(sema)).collect()
    }

    /// Rebuilds every throttled repository queue from cluster state. Started
    /// runs are restored first so the pending side never triggers admissions.
    pub async fn init_queues(&self, cluster: &dyn Cluster) -> Result<()> {
        let repositories = cluster.list_repositories().await?;

        for repo in repositories {
            if !repo.is_throttled() {
                continue;
            }
            info!(
                "Initializing queue for repository {} with concurrency limit {}",
                repo.key(),
                repo.concurrency_limit()
            );

            let mut recovery_errors = Vec::new();

            let started = match list_by_state(cluster, &repo, State::Started).await {
                Ok(runs) => runs,
                Err(e) => {
                    error!(
                        "Failed to list started PipelineRuns for repo {}: {}",
                        repo.key(),
                        e
                    );
                    continue;
                }
            };
            for run in &started {
                let Some(order) = recoverable_order(run, &mut recovery_errors) else {
                    continue;
                };
                let keys = filter_by_state(cluster, &order, State::Started, None).await;
                if keys.is_empty() {
                    warn!("No valid PipelineRuns found in execution order for {}", run.key());
                    continue;
                }
                if let Err(e) = self.restore_running(&repo, &keys) {
                    recovery_errors.push(format!(
                        "Failed to add PipelineRun {} to running queue: {}",
                        run.key(),
                        e
                    ));
                }
            }

            let queued = match list_by_state(cluster, &repo, State::Queued).await {
                Ok(runs) => runs,
                Err(e) => {
                    error!(
                        "Failed to list queued PipelineRuns for repo {}: {}",
                        repo.key(),
                        e
                    );
                    continue;
                }
            };
            for run in &queued {
                let Some(order) = recoverable_order(run, &mut recovery_errors) else {
                    continue;
                };
                let keys =
                    filter_by_state(cluster, &order, State::Queued, Some(SpecStatus::Pending)).await;
                if keys.is_empty() {
                    warn!("No valid PipelineRuns found in execution order for {}", run.key());
                    continue;
                }
                if let Err(e) = self.add_to_pending_queue(&repo, &keys) {
                    recovery_errors.push(format!(
                        "Failed to add PipelineRun {} to pending queue: {}",
                        run.key(),
                        e
                    ));
                }
            }

            if recovery_errors.is_empty() {
                info!("Queue recovery for repo {} completed successfully", repo.key());
            } else {
                warn!(
                    "Queue recovery for repo {} completed with {} errors: {:?}",
                    repo.key(),
                    recovery_errors.len(),
                    recovery_errors
                );
            }

            if let Some(sema) = self.find(&repo.key()) {
                info!(
                    "Queue state for repo {}: {} running, {} pending",
                    repo.key(),
                    sema.current_running().len(),
                    sema.current_pending().len()
                );
            }
        }

        Ok(())
    }
}

fn snapshot_of(sema: &Semaphore) -> QueueSnapshot {
    QueueSnapshot {
        repository: sema.name().to_string(),
        limit: sema.limit(),
        running: sema.current_running(),
        pending: sema.current_pending(),
    }
}

/// Lists the runs of `repo` labelled with `state`, oldest first.
pub(crate) async fn list_by_state(
    cluster: &dyn Cluster,
    repo: &Repository,
    state: State,
) -> pac_cluster::Result<Vec<PipelineRun>> {
    let selector = LabelSelector::new()
        .with(keys::STATE, state.as_str())
        .with(keys::REPOSITORY, repo.name.clone());
    let mut runs = cluster
        .list_pipeline_runs(Some(&repo.namespace), &selector)
        .await?;
    runs.sort_by(|a, b| {
        a.creation_time
            .cmp(&b.creation_time)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(runs)
}

fn recoverable_order(run: &PipelineRun, recovery_errors: &mut Vec<String>) -> Option<Vec<String>> {
    if !run.is_pac_managed() {
        debug!("Skipping non-PAC PipelineRun {}", run.key());
        return None;
    }
    let order = run.execution_order();
    if order.is_none() {
        recovery_errors.push(format!(
            "PipelineRun {} missing execution_order annotation",
            run.key()
        ));
    }
    order
}

/// Keeps the keys whose cluster object is in `state` and, when given, carries
/// `spec_status`. Keys that cannot be read are dropped.
async fn filter_by_state(
    cluster: &dyn Cluster,
    order: &[String],
    state: State,
    spec_status: Option<SpecStatus>,
) -> Vec<String> {
    let mut kept = Vec::new();
    for key in order {
        let run = match cluster.get_pipeline_run_by_key(key).await {
            Ok(run) => run,
            Err(e) => {
                debug!("Skipping {} from execution order: {}", key, e);
                continue;
            }
        };
        if run.state() != Some(state) {
            continue;
        }
        if spec_status.is_some() && run.spec_status != spec_status {
            continue;
        }
        kept.push(key.clone());
    }
    kept
}
