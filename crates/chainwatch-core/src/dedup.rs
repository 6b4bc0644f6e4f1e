//! Process-wide deduplication of entity keys.
//!
//! The set only grows; nothing is evicted for the life of the process.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe set of keys that have already been emitted.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` has been marked.
    pub fn seen(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Record `key` as emitted.
    pub fn mark(&self, key: &str) {
        self.lock().insert(key.to_string());
    }

    /// Atomically mark `key`, returning `true` if this call inserted it.
    ///
    /// Of any number of concurrent callers with the same key, exactly one
    /// observes `true`.
    pub fn check_and_mark(&self, key: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(key) {
            false
        } else {
            seen.insert(key.to_string())
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn mark_then_seen() {
        let d = Deduplicator::new();
        assert!(!d.seen("ABC"));
        d.mark("ABC");
        for _ in 0..3 {
            assert!(d.seen("ABC"));
        }
        assert!(!d.seen("XYZ"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn check_and_mark_first_caller_wins() {
        let d = Deduplicator::new();
        assert!(d.check_and_mark("mint1"));
        assert!(!d.check_and_mark("mint1"));
        assert!(d.seen("mint1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_check_and_mark_single_winner() {
        let d = Arc::new(Deduplicator::new());
        let winners = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let d = Arc::clone(&d);
            let winners = Arc::clone(&winners);
            tasks.push(tokio::spawn(async move {
                if d.check_and_mark("ABC") {
                    winners.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert_eq!(d.len(), 1);
    }
}
