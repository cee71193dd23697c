//! Consistency checks between the in-memory queues and cluster state.

use crate::queue_manager::list_by_state;
use crate::{QueueManager, Result, Semaphore};
use pac_cluster::{Cluster, Repository, SpecStatus, State, split_key};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueValidationResult {
    pub repository_key: String,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub running_count: usize,
    pub pending_count: usize,
    pub expected_count: usize,
}

impl QueueValidationResult {
    fn new(repository_key: String) -> Self {
        Self {
            repository_key,
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            running_count: 0,
            pending_count: 0,
            expected_count: 0,
        }
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
        self.is_valid = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub repaired: usize,
    /// `(repository key, run key)` pairs admitted into freed slots.
    pub promoted: Vec<(String, String)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Running,
    Pending,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Running => "running",
            Side::Pending => "pending",
        }
    }
}

/// Problems with one queued key. An empty list means the key is valid.
async fn inspect(cluster: &dyn Cluster, repo: &Repository, key: &str, side: Side) -> Vec<String> {
    if split_key(key).is_none() {
        return vec![format!("Invalid PipelineRun key format: {}", key)];
    }
    let run = match cluster.get_pipeline_run_by_key(key).await {
        Ok(run) => run,
        Err(e) => return vec![format!("PipelineRun {} not found in cluster: {}", key, e)],
    };
    if !run.is_pac_managed() {
        return vec![format!("PipelineRun {} is not managed by PAC", key)];
    }
    let owner = run.repository_name().unwrap_or_default();
    if owner != repo.name {
        return vec![format!(
            "PipelineRun {} belongs to repository '{}' but queue is for '{}'",
            key, owner, repo.name
        )];
    }

    let mut problems = Vec::new();
    let (wanted, pending_expected) = match side {
        Side::Running => (State::Started, false),
        Side::Pending => (State::Queued, true),
    };
    if run.state() != Some(wanted) {
        problems.push(format!(
            "PipelineRun {} in queue as {} but has state '{}'",
            key,
            side.as_str(),
            run.state().map(|s| s.as_str()).unwrap_or_default()
        ));
    }
    if run.is_pending() != pending_expected {
        let status = run.spec_status.map(|s| s.as_str()).unwrap_or_default();
        problems.push(match side {
            Side::Running => format!("PipelineRun {} in queue as running but has pending status", key),
            Side::Pending => format!(
                "PipelineRun {} in queue as pending but has status '{}'",
                key, status
            ),
        });
    }
    problems
}

async fn validate_one(
    cluster: &dyn Cluster,
    repo: &Repository,
    sema: Option<&Semaphore>,
) -> QueueValidationResult {
    let mut result = QueueValidationResult::new(repo.key());
    let Some(sema) = sema else {
        result.error("No queue found for repository".to_string());
        return result;
    };

    let running = sema.current_running();
    let pending = sema.current_pending();
    result.running_count = running.len();
    result.pending_count = pending.len();

    for key in &running {
        for problem in inspect(cluster, repo, key, Side::Running).await {
            result.error(problem);
        }
    }
    for key in &pending {
        for problem in inspect(cluster, repo, key, Side::Pending).await {
            result.error(problem);
        }
    }

    for (state, tracked, label) in [
        (State::Started, &running, "started"),
        (State::Queued, &pending, "queued"),
    ] {
        match list_by_state(cluster, repo, state).await {
            Ok(runs) => {
                for run in runs.iter().filter(|run| run.is_pac_managed()) {
                    if state == State::Queued && run.spec_status != Some(SpecStatus::Pending) {
                        continue;
                    }
                    let key = run.key();
                    if !tracked.contains(&key) {
                        result.warnings.push(format!(
                            "PipelineRun {} in cluster as {} but not in queue",
                            key, label
                        ));
                    }
                }
            }
            Err(e) => result
                .warnings
                .push(format!("Failed to list {} PipelineRuns: {}", label, e)),
        }
    }

    let limit = usize::try_from(repo.concurrency_limit()).unwrap_or(0);
    if running.len() > limit {
        result.error(format!(
            "Queue has {} running PipelineRuns but limit is {}",
            running.len(),
            limit
        ));
    }
    result.expected_count = limit;
    result
}

impl QueueManager {
    /// Compares every throttled repository queue with the cluster.
    pub async fn validate_queue_consistency(
        &self,
        cluster: &dyn Cluster,
    ) -> Result<Vec<QueueValidationResult>> {
        let repositories = cluster.list_repositories().await?;
        let semaphores: HashMap<String, _> = self
            .semaphores()
            .into_iter()
            .map(|sema| (sema.name().to_string(), sema))
            .collect();

        let mut results = Vec::new();
        for repo in repositories.iter().filter(|repo| repo.is_throttled()) {
            let sema = semaphores.get(&repo.key()).map(|sema| sema.as_ref());
            results.push(validate_one(cluster, repo, sema).await);
        }
        Ok(results)
    }

    /// Drops queue entries that disagree with the cluster, then fills the
    /// freed slots. Promoted keys still need their start transition.
    pub async fn repair_queue(&self, cluster: &dyn Cluster) -> Result<RepairSummary> {
        let repositories = cluster.list_repositories().await?;
        let mut summary = RepairSummary::default();

        for repo in repositories.iter().filter(|repo| repo.is_throttled()) {
            let key = repo.key();
            let Ok(sema) = self.get_semaphore(repo) else {
                warn!("No usable queue for repository {}, skipping repair", key);
                continue;
            };

            let mut invalid = Vec::new();
            for pr_key in sema.current_running() {
                let problems = inspect(cluster, repo, &pr_key, Side::Running).await;
                if !problems.is_empty() {
                    warn!("Will remove {} from running queue: {}", pr_key, problems.join("; "));
                    invalid.push(pr_key);
                }
            }
            for pr_key in sema.current_pending() {
                let problems = inspect(cluster, repo, &pr_key, Side::Pending).await;
                if !problems.is_empty() {
                    warn!("Will remove {} from pending queue: {}", pr_key, problems.join("; "));
                    invalid.push(pr_key);
                }
            }
            if invalid.is_empty() {
                continue;
            }

            info!("Repairing queue for repository {}", key);
            for pr_key in &invalid {
                if sema.remove_from_queue(pr_key) {
                    summary.repaired += 1;
                }
            }
            while let Some(next) = sema.acquire_latest() {
                info!("Started next PipelineRun from queue: {}", next);
                summary.promoted.push((key.clone(), next));
            }
        }

        info!("Queue repair completed. Fixed {} inconsistencies", summary.repaired);
        Ok(summary)
    }
}
