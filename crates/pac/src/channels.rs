use pac_config::constants;
use pac_reconciler::{Request, WorkQueue};
use tokio::sync::{mpsc, watch};

pub struct Channels {
    pub work: WorkQueue,
    pub work_rx: mpsc::Receiver<Request>,
    pub shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub fn create_channels() -> Channels {
    let (work, work_rx) = WorkQueue::new(constants::RECONCILE_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    Channels {
        work,
        work_rx,
        shutdown_tx,
        shutdown_rx,
    }
}
