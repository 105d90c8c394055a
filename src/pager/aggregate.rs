//! Shared result set and first-error cell
//!
//! Both are written concurrently by workers. Each is guarded by its own
//! mutex; neither lock is ever held while the other is taken.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, warn};

/// Append-only accumulation of fetched records
pub struct ResultSet<R> {
    records: Mutex<Vec<R>>,
    pages: AtomicU64,
}

impl<R> ResultSet<R> {
    /// Create an empty result set
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            pages: AtomicU64::new(0),
        }
    }

    /// Append one page of records
    ///
    /// The page is appended as a unit, in its original order. Returns the
    /// running total.
    pub fn append(&self, mut page: Vec<R>) -> usize {
        let mut records = self.records.lock();
        records.append(&mut page);
        self.pages.fetch_add(1, Ordering::Relaxed);
        records.len()
    }

    /// Number of records collected so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if no record has been collected
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of pages appended
    pub fn pages(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }

    /// Take ownership of the collected records
    pub fn into_records(self) -> Vec<R> {
        self.records.into_inner()
    }
}

impl<R> Default for ResultSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-assignment error slot: the first error recorded wins
pub struct FirstError<E> {
    slot: Mutex<Option<(usize, E)>>,
    tripped: AtomicBool,
    discarded: AtomicU64,
}

impl<E: fmt::Display> FirstError<E> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            tripped: AtomicBool::new(false),
            discarded: AtomicU64::new(0),
        }
    }

    /// Lock-free check for a recorded error
    pub fn is_set(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Number of later errors that were logged and dropped
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Record an error from `worker`
    ///
    /// Returns `true` if this was the first error. Later errors are logged
    /// and discarded.
    pub fn record(&self, worker: usize, err: E) -> bool {
        let mut slot = self.slot.lock();

        if let Some((first_worker, _)) = slot.as_ref() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker,
                first_worker = *first_worker,
                error = %err,
                "Discarding fetch error, an earlier failure is already recorded"
            );
            return false;
        }

        error!(worker, error = %err, "Page fetch failed");
        *slot = Some((worker, err));
        self.tripped.store(true, Ordering::Release);
        true
    }

    /// Take the recorded error and the worker that reported it
    pub fn into_inner(self) -> Option<(usize, E)> {
        self.slot.into_inner()
    }
}

impl<E: fmt::Display> Default for FirstError<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_result_set_append() {
        let results = ResultSet::new();
        assert!(results.is_empty());

        assert_eq!(results.append(vec![1, 2, 3]), 3);
        assert_eq!(results.append(Vec::new()), 3);
        assert_eq!(results.append(vec![4]), 4);

        assert_eq!(results.pages(), 3);
        assert_eq!(results.into_records(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_result_set_pages_stay_contiguous() {
        let results = Arc::new(ResultSet::new());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let results = Arc::clone(&results);
                thread::spawn(move || {
                    for page in 0..50u32 {
                        let base = (t * 1000 + page) * 10;
                        results.append((base..base + 10).collect());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let results = Arc::try_unwrap(results).ok().unwrap();
        let records = results.into_records();
        assert_eq!(records.len(), 8 * 50 * 10);

        // Each page's ten records are adjacent and in order
        for chunk in records.chunks(10) {
            assert_eq!(chunk[0] % 10, 0);
            for pair in chunk.windows(2) {
                assert_eq!(pair[1], pair[0] + 1);
            }
        }
    }

    #[test]
    fn test_first_error_wins() {
        let slot = FirstError::new();
        assert!(!slot.is_set());

        assert!(slot.record(2, "boom".to_string()));
        assert!(slot.is_set());
        assert!(!slot.record(5, "later".to_string()));
        assert_eq!(slot.discarded(), 1);

        assert_eq!(slot.into_inner(), Some((2, "boom".to_string())));
    }

    #[test]
    fn test_first_error_concurrent() {
        let slot = Arc::new(FirstError::new());

        let handles: Vec<_> = (0..16)
            .map(|id| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || slot.record(id, format!("worker {id}")))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(slot.discarded(), 15);
    }
}
