use pac_cluster::PipelineRun;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Reconcile the run with this `<namespace>/<name>` key.
    Reconcile(String),
    /// The run disappeared from the cluster. Carries its last known state.
    Finalize(Box<PipelineRun>),
}

impl Request {
    pub fn key(&self) -> String {
        match self {
            Request::Reconcile(key) => key.clone(),
            Request::Finalize(run) => run.key(),
        }
    }
}

/// Sending half of the controller queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<Request>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Request>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn add(&self, key: impl Into<String>) {
        self.send(Request::Reconcile(key.into())).await;
    }

    pub async fn finalize(&self, run: PipelineRun) {
        self.send(Request::Finalize(Box::new(run))).await;
    }

    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        self.send_after(Request::Reconcile(key.into()), delay);
    }

    pub fn send_after(&self, request: Request, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.send(request).await;
        });
    }

    async fn send(&self, request: Request) {
        let key = request.key();
        if self.tx.send(request).await.is_err() {
            warn!("Work queue closed, dropping request for {}", key);
        }
    }
}
