//! Fetch coordinator - orchestrates the parallel paginated fetch
//!
//! The coordinator is responsible for:
//! - Setting up the token queue, result set, and error slot
//! - Seeding the queue with the first-page token
//! - Starting the workers and the termination detector
//! - Joining everything and returning all records or the first error
//!
//! The result is all-or-nothing: on failure the partial record set is
//! dropped.

use crate::config::FetchConfig;
use crate::error::{PagerError, Result, WorkerError};
use crate::pager::detector::{Detection, TerminationDetector};
use crate::pager::page::PageFetcher;
use crate::pager::queue::CloseReason;
use crate::pager::worker::{aggregate_stats, FetchContext, Worker, WorkerTotals};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often progress callbacks fire
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a completed fetch
#[derive(Debug)]
pub struct FetchReport<R> {
    /// Every record from every fetched page
    pub records: Vec<R>,

    /// Pages fetched
    pub pages: u64,

    /// Continuation tokens lost to a full or closed queue
    ///
    /// Non-zero means the record set is incomplete even though the fetch
    /// succeeded.
    pub dropped_tokens: u64,

    /// Highest number of tokens queued at once
    pub peak_queue_len: usize,

    /// Worker threads used
    pub workers: usize,

    /// Time taken for the fetch
    pub duration: Duration,
}

impl<R> FetchReport<R> {
    /// Returns true if no continuation token was lost
    pub fn is_complete(&self) -> bool {
        self.dropped_tokens == 0
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct FetchProgress {
    /// Pages fetched
    pub pages: u64,

    /// Records collected
    pub records: usize,

    /// Tokens waiting in the queue
    pub queued: usize,

    /// Workers mid-fetch
    pub active_workers: usize,

    /// Total workers
    pub total_workers: usize,

    /// Tokens dropped so far
    pub dropped: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl FetchProgress {
    /// Calculate records per second rate
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records as f64 / secs
        } else {
            0.0
        }
    }

    fn snapshot<F: PageFetcher>(ctx: &FetchContext<F>, total_workers: usize, start: Instant) -> Self {
        Self {
            pages: ctx.results.pages(),
            records: ctx.results.len(),
            queued: ctx.queue.len(),
            active_workers: ctx.queue.stats().active_workers(),
            total_workers,
            dropped: ctx.queue.stats().dropped(),
            elapsed: start.elapsed(),
        }
    }
}

type ProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Sync);

/// Coordinates one parallel paginated fetch
#[derive(Debug, Clone)]
pub struct FetchCoordinator {
    config: FetchConfig,
}

impl FetchCoordinator {
    /// Create a coordinator with validated configuration
    pub fn new(config: FetchConfig) -> std::result::Result<Self, crate::error::ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every page reachable from the first page
    pub fn run<F: PageFetcher>(&self, fetcher: F) -> Result<FetchReport<F::Record>, F::Error> {
        self.execute(fetcher, None)
    }

    /// Like [`run`](Self::run), calling `progress` periodically from a
    /// helper thread until the fetch winds down
    pub fn run_with_progress<F, P>(
        &self,
        fetcher: F,
        progress: P,
    ) -> Result<FetchReport<F::Record>, F::Error>
    where
        F: PageFetcher,
        P: Fn(FetchProgress) + Send + Sync,
    {
        self.execute(fetcher, Some(&progress))
    }

    fn execute<F: PageFetcher>(
        &self,
        fetcher: F,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<FetchReport<F::Record>, F::Error> {
        let start = Instant::now();
        let worker_count = self.config.worker_count;

        info!(
            workers = worker_count,
            queue_capacity = self.config.queue_capacity,
            "Starting paginated fetch"
        );

        let ctx = FetchContext::new(fetcher, self.config.queue_capacity, self.config.pop_timeout);

        if !ctx.queue.seed() {
            return Err(WorkerError::SeedFailed.into());
        }

        let outcome = thread::scope(|scope| -> std::result::Result<_, WorkerError> {
            let detector = TerminationDetector::spawn(scope, &ctx.queue, self.config.poll_interval)?;

            let mut workers = Vec::with_capacity(worker_count);
            let mut failure = None;

            for id in 0..worker_count {
                match Worker::spawn(scope, id, &ctx) {
                    Ok(worker) => workers.push(worker),
                    Err(e) => {
                        warn!(worker = id, error = %e, "Worker failed to start, aborting fetch");
                        ctx.queue.close(CloseReason::Aborted);
                        failure = Some(e);
                        break;
                    }
                }
            }

            debug!(count = workers.len(), "Workers spawned");

            let reporter = progress.map(|report| {
                let ctx = &ctx;
                scope.spawn(move || {
                    while ctx.queue.is_open() {
                        report(FetchProgress::snapshot(ctx, worker_count, start));
                        thread::sleep(PROGRESS_INTERVAL);
                    }
                    report(FetchProgress::snapshot(ctx, worker_count, start));
                })
            });

            for worker in &mut workers {
                if let Err(e) = worker.join() {
                    warn!(worker = worker.id(), error = %e, "Worker failed to join cleanly");
                    failure.get_or_insert(e);
                }
            }

            // No-op when the detector already closed it
            ctx.queue.close(CloseReason::Teardown);

            let detection = detector.join();

            if let Some(reporter) = reporter {
                if reporter.join().is_err() {
                    warn!("Progress reporter panicked");
                }
            }

            let totals = aggregate_stats(&workers);
            match failure {
                Some(e) => Err(e),
                None => Ok((totals, detection?)),
            }
        });

        let FetchContext {
            queue,
            results,
            errors,
            ..
        } = ctx;

        if let Some((worker, source)) = errors.into_inner() {
            info!(
                worker,
                pages = results.pages(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Fetch aborted, discarding partial results"
            );
            return Err(PagerError::Fetch { worker, source });
        }

        let (totals, detection): (WorkerTotals, Detection) = outcome?;

        if detection == Detection::Preempted {
            debug!("Queue closed at teardown before the detector observed the drain");
        }

        let stats = queue.stats();
        let dropped_tokens = stats.dropped() + stats.abandoned.load(Ordering::Relaxed);
        if dropped_tokens > 0 {
            warn!(
                dropped = dropped_tokens,
                overflow = stats.overflow_drops.load(Ordering::Relaxed),
                capacity = queue.capacity(),
                "Continuation tokens were lost, result set is incomplete"
            );
        }

        let duration = start.elapsed();
        let pages = results.pages();
        let records = results.into_records();

        info!(
            records = records.len(),
            pages,
            pushed = totals.tokens_pushed,
            duration_ms = duration.as_millis() as u64,
            "Fetch completed"
        );

        Ok(FetchReport {
            records,
            pages,
            dropped_tokens,
            peak_queue_len: stats.peak_len.load(Ordering::Relaxed),
            workers: worker_count,
            duration,
        })
    }
}

/// Fetch every page with `worker_count` workers and default settings
///
/// Returns the records of all pages, or the first fetch error.
pub fn fetch_all<F: PageFetcher>(fetcher: F, worker_count: usize) -> Result<Vec<F::Record>, F::Error> {
    let config = FetchConfig::default().with_workers(worker_count);
    let report = FetchCoordinator::new(config)?.run(fetcher)?;
    Ok(report.records)
}
