use crate::workqueue::WorkQueue;
use pac_cluster::{Cluster, LabelSelector, PipelineRun};
use pac_config::keys;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Runs carry the state label once PAC owns them. Older runs may only have
/// the annotation.
fn is_tracked(run: &PipelineRun) -> bool {
    run.labels.contains_key(keys::STATE) || run.annotations.contains_key(keys::STATE)
}

/// Polls the cluster for PAC-tracked runs and turns changes into work.
pub struct Informer {
    cluster: Arc<dyn Cluster>,
    work: WorkQueue,
    seen: HashMap<String, PipelineRun>,
}

impl Informer {
    pub fn new(cluster: Arc<dyn Cluster>, work: WorkQueue) -> Self {
        Self {
            cluster,
            work,
            seen: HashMap::new(),
        }
    }

    /// One listing pass. New or changed runs are enqueued for reconcile and
    /// runs gone since the last pass for finalize. Returns the number of
    /// requests sent.
    pub async fn poll(&mut self) -> pac_cluster::Result<usize> {
        let runs = self
            .cluster
            .list_pipeline_runs(None, &LabelSelector::new())
            .await?;

        let mut current = HashMap::new();
        let mut sent = 0;
        for run in runs.into_iter().filter(is_tracked) {
            let key = run.key();
            let changed = self
                .seen
                .get(&key)
                .is_none_or(|old| old.resource_version != run.resource_version);
            if changed {
                self.work.add(key.clone()).await;
                sent += 1;
            }
            current.insert(key, run);
        }

        let previous = std::mem::replace(&mut self.seen, current);
        for (key, run) in previous {
            if !self.seen.contains_key(&key) {
                debug!("PipelineRun {} disappeared", key);
                self.work.finalize(run).await;
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Starting informer with interval {:?}", interval);
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if let Err(e) = self.poll().await {
                warn!("Failed to list PipelineRuns: {}", e);
            }
        }
        info!("Informer shut down");
    }
}
