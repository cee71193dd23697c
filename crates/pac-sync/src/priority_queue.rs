//! Binary min-heap of keys ordered by priority, with O(log n) removal by key.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityItem {
    pub key: String,
    pub priority: i64,
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    items: Vec<PriorityItem>,
    index: HashMap<String, usize>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `key` unless it is already queued. Returns whether it was added.
    pub fn add(&mut self, key: &str, priority: i64) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        let at = self.items.len();
        self.items.push(PriorityItem {
            key: key.to_string(),
            priority,
        });
        self.index.insert(key.to_string(), at);
        self.sift_up(at);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<PriorityItem> {
        let at = *self.index.get(key)?;
        Some(self.remove_at(at))
    }

    pub fn pop(&mut self) -> Option<PriorityItem> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    pub fn peek(&self) -> Option<&PriorityItem> {
        self.items.first()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued keys in the order they would be popped.
    pub fn keys(&self) -> Vec<String> {
        let mut items: Vec<&PriorityItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.priority);
        items.into_iter().map(|item| item.key.clone()).collect()
    }

    fn remove_at(&mut self, at: usize) -> PriorityItem {
        let last = self.items.len() - 1;
        self.swap(at, last);
        let item = self.items.swap_remove(last);
        self.index.remove(&item.key);
        if at < self.items.len() {
            self.sift_down(at);
            self.sift_up(at);
        }
        item
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.items[a].priority < self.items[b].priority
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        for at in [a, b] {
            if let Some(slot) = self.index.get_mut(&self.items[at].key) {
                *slot = at;
            }
        }
    }

    fn sift_up(&mut self, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if !self.less(at, parent) {
                break;
            }
            self.swap(at, parent);
            at = parent;
        }
    }

    fn sift_down(&mut self, mut at: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * at + 1;
            let right = left + 1;
            let mut smallest = at;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == at {
                break;
            }
            self.swap(at, smallest);
            at = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_returns_lowest_priority_first() {
        let mut queue = PriorityQueue::new();
        queue.add("c", 30);
        queue.add("a", 10);
        queue.add("d", 40);
        queue.add("b", 20);

        assert_eq!(queue.peek().map(|i| i.key.as_str()), Some("a"));
        let order: Vec<String> = std::iter::from_fn(|| queue.pop().map(|i| i.key)).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert!(queue.pop().is_none());
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut queue = PriorityQueue::new();
        assert!(queue.add("a", 10));
        assert!(!queue.add("a", 1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|i| i.priority), Some(10));
    }

    #[test]
    fn test_remove_keeps_heap_order() {
        let mut queue = PriorityQueue::new();
        for (key, priority) in [("a", 5), ("b", 1), ("c", 9), ("d", 3), ("e", 7), ("f", 2)] {
            queue.add(key, priority);
        }

        assert_eq!(queue.remove("d").map(|i| i.priority), Some(3));
        assert!(queue.remove("d").is_none());
        assert!(queue.remove("missing").is_none());
        assert!(!queue.is_pending("d"));
        assert!(queue.is_pending("e"));

        assert_eq!(queue.keys(), vec!["b", "f", "a", "e", "c"]);
        let order: Vec<String> = std::iter::from_fn(|| queue.pop().map(|i| i.key)).collect();
        assert_eq!(order, vec!["b", "f", "a", "e", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_last_and_only_item() {
        let mut queue = PriorityQueue::new();
        queue.add("only", 1);
        assert!(queue.remove("only").is_some());
        assert_eq!(queue.len(), 0);

        queue.add("a", 1);
        queue.add("b", 2);
        assert!(queue.remove("b").is_some());
        assert_eq!(queue.pop().map(|i| i.key), Some("a".to_string()));
    }
}
