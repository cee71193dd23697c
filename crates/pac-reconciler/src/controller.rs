use crate::workqueue::Request;
use crate::{ReconcileError, Reconciler};
use pac_config::constants;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info};

/// Delay before retrying a request that failed `attempt` times in a row.
pub fn backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    constants::RECONCILE_BASE_BACKOFF
        .saturating_mul(factor)
        .min(constants::RECONCILE_MAX_BACKOFF)
}

#[derive(Default)]
struct Tracker {
    in_flight: HashSet<String>,
    failures: HashMap<String, u32>,
}

impl Tracker {
    /// Marks the request's key in flight. Returns false if it already is.
    fn begin(&mut self, request: &Request) -> bool {
        let key = request.key();
        if !self.in_flight.insert(key.clone()) {
            return false;
        }
        // The run is gone; earlier reconcile failures no longer apply.
        if matches!(request, Request::Finalize(_)) {
            self.failures.remove(&key);
        }
        true
    }

    /// Clears the in-flight mark and returns the attempt number and delay
    /// when the request should be retried.
    fn end(&mut self, key: &str, result: &Result<(), ReconcileError>) -> Option<(u32, Duration)> {
        self.in_flight.remove(key);
        match result {
            Err(e) if !e.is_not_found() => {
                let attempt = self.failures.entry(key.to_string()).or_insert(0);
                *attempt += 1;
                Some((*attempt, backoff(*attempt)))
            }
            _ => {
                self.failures.remove(key);
                None
            }
        }
    }
}

/// Runs reconciles from `rx` on up to `max_concurrent` tasks. A key is never
/// reconciled twice at once, and failed requests come back with exponential
/// backoff. Returns once `shutdown` fires and in-flight work has drained.
pub async fn run_controller(
    mut rx: mpsc::Receiver<Request>,
    reconciler: Arc<Reconciler>,
    max_concurrent: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let max_concurrent = max_concurrent.max(1);
    info!(
        "Starting controller with max_concurrent_reconciles={}",
        max_concurrent
    );

    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let tracker = Arc::new(Mutex::new(Tracker::default()));

    loop {
        let request = tokio::select! {
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        let key = request.key();
        if !tracker.lock().begin(&request) {
            debug!("{} is already being reconciled, retrying shortly", key);
            reconciler
                .work
                .send_after(request, constants::IN_FLIGHT_REQUEUE_DELAY);
            continue;
        }

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let reconciler = reconciler.clone();
        let tracker = tracker.clone();

        tokio::spawn(async move {
            let deadline = reconciler.config.reconcile_timeout;
            let result = match tokio::time::timeout(deadline, reconciler.handle(&request)).await {
                Ok(result) => result,
                Err(_) => {
                    let requeued = reconciler.requeue_stalled_admissions().await;
                    if requeued > 0 {
                        info!("Requeued {} stalled PipelineRun(s) after {} timed out", requeued, key);
                    }
                    Err(ReconcileError::Timeout(key.clone()))
                }
            };

            let retry_in = tracker.lock().end(&key, &result);

            match (result, retry_in) {
                (Err(e), Some((attempt, delay))) => {
                    error!(
                        "Reconcile of {} failed (attempt {}), retrying in {:?}: {}",
                        key, attempt, delay, e
                    );
                    reconciler.work.send_after(request, delay);
                }
                (Err(e), None) => debug!("Dropping {}: {}", key, e),
                _ => {}
            }
            drop(permit);
        });
    }

    info!("Controller stopping, waiting for in-flight reconciles");
    let _ = semaphore.acquire_many(max_concurrent as u32).await;
    info!("Controller shut down");
}
