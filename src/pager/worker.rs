//! Fetch worker threads
//!
//! Each worker:
//! - Pulls a continuation token from the shared queue
//! - Calls the page fetcher with it
//! - Appends the page's records to the shared result set
//! - Pushes the follow-on token (if any) back to the queue
//!
//! A worker stops when the queue yields nothing within the dequeue
//! timeout, when the queue is closed, or once any worker has recorded a
//! fetch failure.

use crate::error::WorkerError;
use crate::pager::aggregate::{FirstError, ResultSet};
use crate::pager::page::{PageFetcher, PageToken};
use crate::pager::queue::{CloseReason, TokenQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// State shared by all workers of one fetch
pub struct FetchContext<F: PageFetcher> {
    /// Caller's page fetcher
    pub fetcher: F,

    /// Pending continuation tokens
    pub queue: TokenQueue<F::Token>,

    /// Collected records
    pub results: ResultSet<F::Record>,

    /// First fetch failure
    pub errors: FirstError<F::Error>,

    /// How long a worker waits for a token before giving up
    pub pop_timeout: Duration,
}

impl<F: PageFetcher> FetchContext<F> {
    /// Create the shared state for a fetch
    pub fn new(fetcher: F, queue_capacity: usize, pop_timeout: Duration) -> Self {
        Self {
            fetcher,
            queue: TokenQueue::new(queue_capacity),
            results: ResultSet::new(),
            errors: FirstError::new(),
            pop_timeout,
        }
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Pages fetched successfully
    pub pages: AtomicU64,

    /// Records returned by those pages
    pub records: AtomicU64,

    /// Follow-on tokens queued
    pub tokens_pushed: AtomicU64,

    /// Follow-on tokens the queue rejected
    pub tokens_dropped: AtomicU64,

    /// Tokens popped after a failure and never fetched
    pub abandoned: AtomicU64,

    /// Failed fetches
    pub errors: AtomicU64,
}

impl WorkerStats {
    fn record_page(&self, records: usize) {
        self.pages.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    fn record_push(&self, accepted: bool) {
        if accepted {
            self.tokens_pushed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tokens_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Totals across all workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTotals {
    pub pages: u64,
    pub records: u64,
    pub tokens_pushed: u64,
    pub tokens_dropped: u64,
    pub abandoned: u64,
    pub errors: u64,
}

/// A worker thread that processes continuation tokens
pub struct Worker<'scope> {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<ScopedJoinHandle<'scope, ()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl<'scope> Worker<'scope> {
    /// Spawn a new worker thread inside `scope`
    pub fn spawn<'env, F: PageFetcher>(
        scope: &'scope Scope<'scope, 'env>,
        id: usize,
        ctx: &'scope FetchContext<F>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("pager-{}", id))
            .spawn_scoped(scope, move || worker_loop(id, ctx, &stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    ///
    /// Statistics stay readable afterwards. Joining twice is a no-op.
    pub fn join(&mut self) -> Result<(), WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "Worker thread panicked".into());
            WorkerError::Panicked {
                id: self.id,
                message,
            }
        })
    }
}

/// Main worker loop
fn worker_loop<F: PageFetcher>(id: usize, ctx: &FetchContext<F>, stats: &WorkerStats) {
    debug!(worker = id, "Worker starting");

    loop {
        if ctx.errors.is_set() {
            debug!(worker = id, "Failure recorded elsewhere, stopping");
            break;
        }

        let Some(lease) = ctx.queue.pop(ctx.pop_timeout) else {
            if ctx.queue.is_open() {
                debug!(worker = id, timeout = ?ctx.pop_timeout, "No token within timeout, exiting");
            } else {
                debug!(worker = id, "Token queue closed, exiting");
            }
            break;
        };

        // Popped after another worker failed: never fetch it
        if ctx.errors.is_set() {
            stats.record_abandoned();
            break;
        }

        match ctx.fetcher.fetch_page(lease.token()) {
            Ok(page) => {
                let count = page.records.len();
                let total = ctx.results.append(page.records);
                stats.record_page(count);

                trace!(
                    worker = id,
                    token = ?lease.token(),
                    records = count,
                    total = total,
                    last = page.next.is_none(),
                    "Page fetched"
                );

                if let Some(next) = page.next {
                    stats.record_push(ctx.queue.push(PageToken::Resume(next)));
                }
            }
            Err(err) => {
                stats.record_error();
                if ctx.errors.record(id, err) {
                    ctx.queue.close(CloseReason::Aborted);
                }
                break;
            }
        }

        // Lease drops here, after the follow-on push
    }

    debug!(
        worker = id,
        pages = stats.pages.load(Ordering::Relaxed),
        records = stats.records.load(Ordering::Relaxed),
        "Worker finished"
    );
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker<'_>]) -> WorkerTotals {
    workers
        .iter()
        .fold(WorkerTotals::default(), |mut totals, worker| {
            let s = worker.stats();
            totals.pages += s.pages.load(Ordering::Relaxed);
            totals.records += s.records.load(Ordering::Relaxed);
            totals.tokens_pushed += s.tokens_pushed.load(Ordering::Relaxed);
            totals.tokens_dropped += s.tokens_dropped.load(Ordering::Relaxed);
            totals.abandoned += s.abandoned.load(Ordering::Relaxed);
            totals.errors += s.errors.load(Ordering::Relaxed);
            totals
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::page::{fetcher_fn, Page};
    use std::io;

    const WAIT: Duration = Duration::from_millis(20);

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();

        stats.record_page(10);
        stats.record_push(true);
        stats.record_push(false);
        stats.record_abandoned();
        stats.record_error();

        assert_eq!(stats.pages.load(Ordering::Relaxed), 1);
        assert_eq!(stats.records.load(Ordering::Relaxed), 10);
        assert_eq!(stats.tokens_pushed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.tokens_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.abandoned.load(Ordering::Relaxed), 1);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_single_worker_follows_chain() {
        let fetcher = fetcher_fn(|token: &PageToken<u32>| {
            let n = token.as_resume().copied().unwrap_or(0);
            Ok::<_, io::Error>(Page::new(vec![n; 2], (n < 3).then_some(n + 1)))
        });
        let ctx = FetchContext::new(fetcher, 8, WAIT);
        ctx.queue.seed();

        let stats = WorkerStats::default();
        worker_loop(0, &ctx, &stats);

        // Nobody closed the queue, so the worker left on timeout
        assert!(ctx.queue.is_open());
        assert_eq!(ctx.queue.pending(), 0);
        assert_eq!(stats.pages.load(Ordering::Relaxed), 4);
        assert_eq!(stats.tokens_pushed.load(Ordering::Relaxed), 3);
        assert_eq!(ctx.results.into_records(), vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_worker_stops_on_error() {
        let fetcher = fetcher_fn(|token: &PageToken<u32>| match token {
            PageToken::Start => Ok(Page::new(vec!["a"], Some(1))),
            PageToken::Resume(_) => Err(io::Error::new(io::ErrorKind::Other, "page 1 gone")),
        });
        let ctx = FetchContext::new(fetcher, 8, WAIT);
        ctx.queue.seed();

        let stats = WorkerStats::default();
        worker_loop(4, &ctx, &stats);

        assert!(ctx.errors.is_set());
        assert!(!ctx.queue.is_open());
        assert_eq!(ctx.queue.close_reason(), Some(CloseReason::Aborted));
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);

        let (worker, err) = ctx.errors.into_inner().unwrap();
        assert_eq!(worker, 4);
        assert_eq!(err.to_string(), "page 1 gone");
    }

    #[test]
    fn test_worker_skips_work_after_failure() {
        let fetcher = fetcher_fn(|_: &PageToken<u32>| -> Result<Page<u32, u32>, io::Error> {
            panic!("must not be called")
        });
        let ctx = FetchContext::new(fetcher, 8, WAIT);
        ctx.queue.seed();
        ctx.errors.record(9, io::Error::new(io::ErrorKind::Other, "earlier"));

        let stats = WorkerStats::default();
        worker_loop(0, &ctx, &stats);

        assert_eq!(stats.pages.load(Ordering::Relaxed), 0);
        assert_eq!(ctx.queue.len(), 1);
    }

    #[test]
    fn test_spawn_and_join() {
        let fetcher = fetcher_fn(|_: &PageToken<u32>| Ok::<_, io::Error>(Page::last(vec![1, 2, 3])));
        let ctx = FetchContext::new(fetcher, 8, WAIT);
        ctx.queue.seed();

        let totals = thread::scope(|scope| {
            let mut workers: Vec<_> = (0..2)
                .map(|id| Worker::spawn(scope, id, &ctx).unwrap())
                .collect();
            for worker in &mut workers {
                worker.join().unwrap();
            }
            assert!(workers[1].join().is_ok());
            aggregate_stats(&workers)
        });

        assert_eq!(totals.pages, 1);
        assert_eq!(totals.records, 3);
        assert_eq!(totals.errors, 0);
        assert_eq!(ctx.results.len(), 3);
    }

    #[test]
    fn test_join_reports_panic() {
        let fetcher = fetcher_fn(|_: &PageToken<u32>| -> Result<Page<u32, u32>, io::Error> {
            panic!("fetcher exploded")
        });
        let ctx = FetchContext::new(fetcher, 8, WAIT);
        ctx.queue.seed();

        let result = thread::scope(|scope| {
            let mut worker = Worker::spawn(scope, 7, &ctx).unwrap();
            worker.join()
        });

        match result {
            Err(WorkerError::Panicked { id, message }) => {
                assert_eq!(id, 7);
                assert_eq!(message, "fetcher exploded");
            }
            other => panic!("expected panic error, got {:?}", other),
        }
        assert_eq!(ctx.queue.pending(), 0);
    }
}
