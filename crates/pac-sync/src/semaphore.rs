//! Per-repository concurrency gate: a bounded running set plus a pending
//! priority queue behind one mutex.
//!
//! No method calls another locking method while holding the lock. Shared steps
//! live on [`Inner`] and operate on already-locked state.

use crate::priority_queue::PriorityQueue;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of [`Semaphore::try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    Waiting(String),
}

impl Acquire {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquire::Acquired)
    }
}

#[derive(Debug)]
struct Inner {
    limit: usize,
    /// Running keys with the priority they held while pending.
    running: HashMap<String, i64>,
    pending: PriorityQueue,
}

impl Inner {
    fn is_full(&self) -> bool {
        self.running.len() >= self.limit
    }

    fn admit_head(&mut self) -> Option<String> {
        if self.is_full() {
            return None;
        }
        let item = self.pending.pop()?;
        self.running.insert(item.key.clone(), item.priority);
        Some(item.key)
    }

    fn enqueue(&mut self, key: &str, priority: i64) -> bool {
        if key.is_empty() || self.running.contains_key(key) {
            return false;
        }
        self.pending.add(key, priority)
    }
}

#[derive(Debug)]
pub struct Semaphore {
    name: String,
    inner: Mutex<Inner>,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, limit: usize) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                limit,
                running: HashMap::new(),
                pending: PriorityQueue::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        self.inner.lock().limit
    }

    /// Queues `key` with `priority` (unix nanoseconds). Returns `false` when the
    /// key is empty, already running or already pending.
    pub fn add_to_queue(&self, key: &str, priority: i64) -> bool {
        self.inner.lock().enqueue(key, priority)
    }

    /// Same as [`Semaphore::add_to_queue`], used when rebuilding state at startup.
    pub fn add_to_pending_queue(&self, key: &str, priority: i64) -> bool {
        self.inner.lock().enqueue(key, priority)
    }

    /// Places `key` straight into the running set, ignoring the limit. Used to
    /// restore runs the cluster already reports as started.
    pub fn add_to_running(&self, key: &str, priority: i64) -> bool {
        let mut inner = self.inner.lock();
        if key.is_empty() || inner.running.contains_key(key) {
            return false;
        }
        inner.pending.remove(key);
        inner.running.insert(key.to_string(), priority);
        true
    }

    /// Admits `key` only when it heads the pending queue and a slot is free.
    /// Succeeds without side effects when `key` already runs.
    pub fn try_acquire(&self, key: &str) -> Acquire {
        if key.is_empty() {
            return Acquire::Waiting("Invalid key".to_string());
        }

        let mut inner = self.inner.lock();
        if inner.running.contains_key(key) {
            return Acquire::Acquired;
        }
        if inner.is_full() {
            return Acquire::Waiting(format!(
                "Waiting for {} lock. Limit reached: {}/{}",
                self.name,
                inner.running.len(),
                inner.limit
            ));
        }
        if inner.pending.peek().is_none_or(|head| head.key != key) {
            return Acquire::Waiting(format!(
                "Waiting for {} lock. Available queue status: {}/{}",
                self.name,
                inner.limit - inner.running.len(),
                inner.limit
            ));
        }

        match inner.pending.pop() {
            Some(item) => {
                inner.running.insert(item.key, item.priority);
                Acquire::Acquired
            }
            None => Acquire::Waiting(format!("Waiting for {} lock", self.name)),
        }
    }

    /// Moves the pending head into the running set if a slot is free.
    pub fn acquire_latest(&self) -> Option<String> {
        self.inner.lock().admit_head()
    }

    pub fn release(&self, key: &str) -> bool {
        self.inner.lock().running.remove(key).is_some()
    }

    /// Drops `key` from both the running set and the pending queue. Returns
    /// whether it was in either.
    pub fn remove_from_queue(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let was_running = inner.running.remove(key).is_some();
        let was_pending = inner.pending.remove(key).is_some();
        was_running || was_pending
    }

    /// Removes `key` from either set and admits the next pending key, all in one
    /// critical section. Returns whether `key` was present and the admitted key.
    pub fn release_and_acquire_next(&self, key: &str) -> (bool, Option<String>) {
        let mut inner = self.inner.lock();
        let was_running = inner.running.remove(key).is_some();
        let was_pending = inner.pending.remove(key).is_some();
        if !was_running && !was_pending {
            return (false, None);
        }
        (true, inner.admit_head())
    }

    /// Moves a running key back to the pending queue. Without an explicit
    /// priority the key regains the position it held before admission.
    pub fn requeue_to_pending(&self, key: &str, priority: Option<i64>) -> bool {
        let mut inner = self.inner.lock();
        match inner.running.remove(key) {
            Some(admitted) => {
                inner.pending.add(key, priority.unwrap_or(admitted));
                true
            }
            None => false,
        }
    }

    /// Changes the limit. Keys above a lowered limit keep running and drain as
    /// they are released.
    pub fn resize(&self, limit: i32) -> bool {
        let Ok(limit) = usize::try_from(limit) else {
            return false;
        };
        self.inner.lock().limit = limit;
        true
    }

    /// Running keys in admission order.
    pub fn current_running(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut running: Vec<(&String, &i64)> = inner.running.iter().collect();
        running.sort_by_key(|(key, priority)| (**priority, (*key).clone()));
        running.into_iter().map(|(key, _)| key.clone()).collect()
    }

    /// Pending keys in the order they will be admitted.
    pub fn current_pending(&self) -> Vec<String> {
        self.inner.lock().pending.keys()
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.inner.lock().running.contains_key(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.lock().pending.is_pending(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn within(timeout: Duration, f: impl FnOnce() + Send + 'static) {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            f();
            let _ = tx.send(());
        });
        rx.recv_timeout(timeout)
            .expect("operation did not complete in time, possible deadlock");
    }

    #[test]
    fn test_try_acquire_is_idempotent_for_running_key() {
        let sema = Semaphore::new("ns/repo", 1);
        sema.add_to_queue("ns/a", 1);
        assert!(sema.try_acquire("ns/a").is_acquired());

        assert_eq!(sema.try_acquire("ns/a"), Acquire::Acquired);
        assert_eq!(sema.current_running(), vec!["ns/a"]);
        assert!(sema.current_pending().is_empty());
    }

    #[test]
    fn test_try_acquire_requires_head_of_queue() {
        let sema = Semaphore::new("ns/repo", 2);
        sema.add_to_queue("ns/a", 1);
        sema.add_to_queue("ns/b", 2);

        assert_eq!(
            sema.try_acquire("ns/b"),
            Acquire::Waiting("Waiting for ns/repo lock. Available queue status: 2/2".to_string())
        );
        assert!(sema.try_acquire("ns/a").is_acquired());
        assert!(sema.try_acquire("ns/b").is_acquired());

        sema.add_to_queue("ns/c", 3);
        assert_eq!(
            sema.try_acquire("ns/c"),
            Acquire::Waiting("Waiting for ns/repo lock. Limit reached: 2/2".to_string())
        );
    }

    #[test]
    fn test_add_to_queue_rejects_running_and_duplicate_keys() {
        let sema = Semaphore::new("ns/repo", 1);
        assert!(!sema.add_to_queue("", 1));
        assert!(sema.add_to_queue("ns/a", 1));
        assert!(!sema.add_to_queue("ns/a", 2));
        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));
        assert!(!sema.add_to_queue("ns/a", 3));
    }

    #[test]
    fn test_add_then_remove_restores_state() {
        let sema = Semaphore::new("ns/repo", 1);
        sema.add_to_queue("ns/a", 1);
        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));
        sema.add_to_queue("ns/b", 2);
        let running = sema.current_running();
        let pending = sema.current_pending();

        sema.add_to_queue("ns/c", 3);
        sema.remove_from_queue("ns/c");

        assert_eq!(sema.current_running(), running);
        assert_eq!(sema.current_pending(), pending);
    }

    #[test]
    fn test_acquire_then_release_restores_running() {
        let sema = Semaphore::new("ns/repo", 2);
        sema.add_to_queue("ns/a", 1);
        sema.acquire_latest();
        let before = sema.current_running();

        sema.add_to_queue("ns/b", 2);
        let acquired = sema.acquire_latest().unwrap();
        assert!(sema.release(&acquired));
        sema.remove_from_queue(&acquired);

        assert_eq!(sema.current_running(), before);
        assert!(!sema.release(&acquired));
    }

    #[test]
    fn test_acquire_latest_respects_limit() {
        let sema = Semaphore::new("ns/repo", 1);
        assert_eq!(sema.acquire_latest(), None);
        sema.add_to_queue("ns/a", 1);
        sema.add_to_queue("ns/b", 2);
        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));
        assert_eq!(sema.acquire_latest(), None);
        assert_eq!(sema.current_pending(), vec!["ns/b"]);
    }

    #[test]
    fn test_requeue_restores_original_priority() {
        let sema = Semaphore::new("ns/repo", 1);
        sema.add_to_queue("ns/a", 10);
        sema.add_to_queue("ns/b", 20);
        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));

        assert!(sema.requeue_to_pending("ns/a", None));
        assert!(!sema.requeue_to_pending("ns/a", None));
        assert!(!sema.is_running("ns/a"));
        assert!(sema.is_pending("ns/a"));

        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));
    }

    #[test]
    fn test_requeue_with_explicit_priority() {
        let sema = Semaphore::new("ns/repo", 1);
        sema.add_to_queue("ns/a", 10);
        sema.add_to_queue("ns/b", 20);
        sema.acquire_latest();

        assert!(sema.requeue_to_pending("ns/a", Some(30)));
        assert_eq!(sema.current_pending(), vec!["ns/b", "ns/a"]);
    }

    #[test]
    fn test_requeue_is_atomic_for_observers() {
        let sema = Arc::new(Semaphore::new("ns/repo", 1));
        sema.add_to_queue("ns/a", 1);
        sema.acquire_latest();

        let observer = {
            let sema = sema.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let inner = sema.inner.lock();
                    let visible =
                        inner.running.contains_key("ns/a") || inner.pending.is_pending("ns/a");
                    assert!(visible, "key vanished from both sets");
                }
            })
        };

        for _ in 0..10_000 {
            assert!(sema.requeue_to_pending("ns/a", None));
            assert_eq!(sema.acquire_latest().as_deref(), Some("ns/a"));
        }
        observer.join().unwrap();
    }

    #[test]
    fn test_resize_down_blocks_new_admissions_until_drained() {
        let sema = Semaphore::new("ns/repo", 3);
        for (i, key) in ["ns/a", "ns/b", "ns/c", "ns/d"].iter().enumerate() {
            sema.add_to_queue(key, i as i64);
        }
        for _ in 0..3 {
            sema.acquire_latest();
        }

        assert!(sema.resize(1));
        assert_eq!(sema.limit(), 1);
        assert_eq!(sema.current_running().len(), 3);
        assert_eq!(sema.acquire_latest(), None);

        sema.release("ns/a");
        sema.release("ns/b");
        assert_eq!(sema.acquire_latest(), None);
        sema.release("ns/c");
        assert_eq!(sema.acquire_latest().as_deref(), Some("ns/d"));
    }

    #[test]
    fn test_resize_rejects_negative_limit() {
        let sema = Semaphore::new("ns/repo", 1);
        assert!(!sema.resize(-1));
        assert_eq!(sema.limit(), 1);
        assert!(sema.resize(0));
        assert_eq!(sema.limit(), 0);
    }

    #[test]
    fn test_release_and_acquire_next() {
        let sema = Semaphore::new("ns/repo", 1);
        sema.add_to_queue("ns/a", 1);
        sema.add_to_queue("ns/b", 2);
        sema.acquire_latest();

        assert_eq!(
            sema.release_and_acquire_next("ns/a"),
            (true, Some("ns/b".to_string()))
        );
        assert_eq!(sema.release_and_acquire_next("ns/a"), (false, None));
        assert_eq!(sema.release_and_acquire_next("ns/b"), (true, None));
    }

    #[test]
    fn test_operations_complete_without_deadlock() {
        let timeout = Duration::from_secs(2);
        let ops: Vec<fn(&Semaphore)> = vec![
            |s| {
                s.add_to_queue("ns/b", 2);
            },
            |s| {
                s.add_to_pending_queue("ns/b", 2);
            },
            |s| {
                s.try_acquire("ns/a");
            },
            |s| {
                s.acquire_latest();
            },
            |s| {
                s.release("ns/a");
            },
            |s| {
                s.remove_from_queue("ns/a");
            },
            |s| {
                s.requeue_to_pending("ns/a", None);
            },
            |s| {
                s.resize(2);
            },
            |s| {
                s.release_and_acquire_next("ns/a");
            },
            |s| {
                s.current_running();
                s.current_pending();
                s.limit();
            },
        ];

        for op in ops {
            let sema = Semaphore::new("ns/repo", 1);
            sema.add_to_queue("ns/a", 1);
            within(timeout, move || op(&sema));
        }
    }

    #[test]
    fn test_concurrent_try_acquire_completes() {
        let sema = Arc::new(Semaphore::new("ns/repo", 1));
        sema.add_to_queue("ns/a", 1);

        let (tx, rx) = mpsc::channel();
        for _ in 0..2 {
            let sema = sema.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let outcome = sema.try_acquire("ns/a");
                let _ = tx.send(outcome);
            });
        }

        for _ in 0..2 {
            let outcome = rx
                .recv_timeout(Duration::from_secs(3))
                .expect("try_acquire did not complete in time");
            assert!(outcome.is_acquired());
        }
        assert_eq!(sema.current_running(), vec!["ns/a"]);
    }
}
