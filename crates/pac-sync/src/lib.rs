mod audit;
mod error;
pub mod priority_queue;
mod queue_manager;
pub mod semaphore;

pub use audit::{QueueValidationResult, RepairSummary};
pub use error::{Result, SyncError};
pub use priority_queue::{PriorityItem, PriorityQueue};
pub use queue_manager::{QueueManager, QueueSnapshot};
pub use semaphore::{Acquire, Semaphore};
