mod audit;
mod cleanup;
mod controller;
mod error;
mod finalizer;
mod informer;
pub mod log_snippet;
mod reconciler;
mod report;
mod workqueue;

#[cfg(test)]
mod test_support;

pub use audit::{audit_queues, run_queue_audit_job};
pub use controller::{backoff, run_controller};
pub use error::{ReconcileError, Result};
pub use informer::Informer;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use report::conclusion_for;
pub use workqueue::{Request, WorkQueue};
