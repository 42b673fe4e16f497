//! Per-key mutual exclusion.
//!
//! Read-modify-write sequences on one key (a user's domain ledger, a user's
//! habits) must not interleave; sequences on different keys may run in
//! parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A lazily-populated table of mutexes, one per key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the table entry once no other caller holds or waits on it.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under the table lock, so the count is stable here.
        if Arc::strong_count(&lock) == 2 {
            table.remove(key);
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        self.with_locks(&[key], f)
    }

    /// Run `f` while holding the locks for every key in `keys`.
    ///
    /// Keys are deduplicated and locked in sorted order.
    pub fn with_locks<K: AsRef<str>, T>(&self, keys: &[K], f: impl FnOnce() -> T) -> T {
        let mut keys: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        keys.sort_unstable();
        keys.dedup();

        let locks: Vec<_> = keys.iter().map(|key| self.lock_for(key)).collect();
        let result = {
            // A panic inside a previous holder leaves no state behind the unit mutex.
            let _guards: Vec<_> = locks
                .iter()
                .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };
        for (key, lock) in keys.into_iter().zip(locks) {
            self.release(key, lock);
        }
        result
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_key_sections_do_not_interleave() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with_lock("user:domain", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn distinct_keys_get_distinct_locks() {
        let locks = KeyedLocks::new();
        let nested = locks.with_lock("a", || locks.with_lock("b", || locks.len()));
        assert_eq!(nested, 2);
        assert!(locks.is_empty());
    }

    #[test]
    fn entries_are_dropped_after_use() {
        let locks = KeyedLocks::new();
        for user in 0..100 {
            locks.with_lock(&format!("user-{user}"), || ());
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn multi_key_sections_dedupe_and_release() {
        let locks = KeyedLocks::new();
        let keys = ["u1:b", "u1:a", "u1:b"];
        let held = locks.with_locks(&keys, || locks.len());
        assert_eq!(held, 2);
        assert!(locks.is_empty());

        let none: [&str; 0] = [];
        assert_eq!(locks.with_locks(&none, || 3), 3);
    }

    #[test]
    fn overlapping_key_sets_do_not_deadlock() {
        let locks = Arc::new(KeyedLocks::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    let keys = if i % 2 == 0 { ["x", "y"] } else { ["y", "x"] };
                    for _ in 0..200 {
                        locks.with_locks(&keys, || ());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(locks.is_empty());
    }
}
