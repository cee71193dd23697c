use crate::workqueue::WorkQueue;
use pac_cluster::Cluster;
use pac_sync::QueueManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Validates every queue against the cluster and, with `repair`, fixes the
/// inconsistent ones. Runs admitted by a repair are enqueued so they start.
/// Returns the number of inconsistent queues found.
pub async fn audit_queues(
    cluster: &dyn Cluster,
    queues: &QueueManager,
    work: &WorkQueue,
    repair: bool,
) -> pac_sync::Result<usize> {
    let results = queues.validate_queue_consistency(cluster).await?;

    let mut invalid = 0;
    for result in &results {
        for warning in &result.warnings {
            info!("Queue {}: {}", result.repository_key, warning);
        }
        if !result.is_valid {
            invalid += 1;
            warn!(
                "Queue {} is inconsistent ({} running, {} pending, {} expected): {}",
                result.repository_key,
                result.running_count,
                result.pending_count,
                result.expected_count,
                result.errors.join("; ")
            );
        }
    }

    if invalid > 0 && repair {
        let summary = queues.repair_queue(cluster).await?;
        info!("Repaired {} queue(s)", summary.repaired);
        for (repository, key) in summary.promoted {
            info!("Starting {} admitted by repair of {}", key, repository);
            work.add(key).await;
        }
    }
    Ok(invalid)
}

pub async fn run_queue_audit_job(
    cluster: Arc<dyn Cluster>,
    queues: Arc<QueueManager>,
    work: WorkQueue,
    interval: Duration,
    repair: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting queue audit job (repair: {})", repair);

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match audit_queues(cluster.as_ref(), &queues, &work, repair).await {
            Ok(0) => {}
            Ok(invalid) => warn!("Queue audit found {} inconsistent queue(s)", invalid),
            Err(e) => error!("Queue audit failed: {}", e),
        }
    }
    info!("Queue audit job shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::workqueue::Request;

    #[tokio::test]
    async fn test_repair_drops_vanished_run_and_enqueues_successor() {
        let mut h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1", "pr2"]));
        h.cluster.insert_pipeline_run(queued_run("pr2", &["pr1", "pr2"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        h.cluster.remove_pipeline_run("ns", "pr1");

        let invalid = audit_queues(h.cluster.as_ref(), &h.queues, &h.reconciler.work, false)
            .await
            .unwrap();
        assert_eq!(invalid, 1);
        assert!(h.queues.is_running("ns/repo", "ns/pr1"));

        let invalid = audit_queues(h.cluster.as_ref(), &h.queues, &h.reconciler.work, true)
            .await
            .unwrap();
        assert_eq!(invalid, 1);
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr2"]);
        assert_eq!(
            h.rx.recv().await.unwrap(),
            Request::Reconcile("ns/pr2".to_string())
        );
    }

    #[tokio::test]
    async fn test_consistent_queues_are_left_alone() {
        let h = Harness::new(Some(1));
        let pr1 = h.cluster.insert_pipeline_run(queued_run("pr1", &["pr1"]));
        h.reconciler.reconcile(&pr1).await.unwrap();

        let invalid = audit_queues(h.cluster.as_ref(), &h.queues, &h.reconciler.work, true)
            .await
            .unwrap();
        assert_eq!(invalid, 0);
        assert_eq!(h.queues.running_pipeline_runs("ns/repo"), vec!["ns/pr1"]);
    }
}
