//! Per-graph string interning.
//!
//! Every table, column, edge-type, and operation string stored in a
//! [`crate::graph::LineageGraph`] goes through the graph's own pool, so
//! equal-valued strings inside one graph share a single allocation and can be
//! compared by pointer. Pools are monotonic; `compact()` on the graph swaps in
//! a fresh pool and re-interns the surviving strings.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A deduplicating pool of immutable strings.
///
/// Concurrent callers may interleave freely; the pool is internally
/// synchronized and never evicts.
#[derive(Debug, Default)]
pub struct StringPool {
    entries: Mutex<HashSet<Arc<str>>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical instance for `s`, inserting it on first sight.
    pub fn intern(&self, s: &str) -> Arc<str> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(s) {
            return existing.clone();
        }
        let stored: Arc<str> = Arc::from(s);
        entries.insert(stored.clone());
        stored
    }

    /// Number of distinct strings held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_share_storage() {
        let pool = StringPool::new();
        let a = pool.intern("Orders");
        let b = pool.intern("Orders");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_strings_are_distinct() {
        let pool = StringPool::new();
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn interning_is_case_sensitive() {
        let pool = StringPool::new();
        let a = pool.intern("Orders");
        let b = pool.intern("orders");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn concurrent_interning_converges() {
        let pool = Arc::new(StringPool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        pool.intern(&format!("shared-{}", i % 10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.len(), 10);
    }
}
