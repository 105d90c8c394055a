//! Termination detection
//!
//! Workers both consume and produce tokens, so an empty queue alone does
//! not mean the fetch is over. The detector waits on the queue's pending
//! counter (queued tokens plus in-flight leases). Once it reaches zero no
//! worker can produce more work, and the detector closes the queue so
//! workers blocked in `pop` return immediately.

use crate::error::WorkerError;
use crate::pager::queue::{Quiescence, TokenQueue};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default heartbeat interval for the detector
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How the detector finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The detector closed the queue after it drained
    Drained { waited: Duration },

    /// The queue was closed by someone else first
    Preempted,
}

/// Supervisory thread that closes the token queue once all work is done
pub struct TerminationDetector<'scope> {
    handle: Option<ScopedJoinHandle<'scope, Detection>>,
}

impl<'scope> TerminationDetector<'scope> {
    /// Spawn the detector inside `scope`
    ///
    /// `poll_interval` bounds each wait on the queue and paces the debug
    /// heartbeat; completion is signalled without waiting for it.
    pub fn spawn<'env, T>(
        scope: &'scope Scope<'scope, 'env>,
        queue: &'scope TokenQueue<T>,
        poll_interval: Duration,
    ) -> Result<Self, WorkerError>
    where
        T: Send,
    {
        let handle = thread::Builder::new()
            .name("pager-detector".into())
            .spawn_scoped(scope, move || detect(queue, poll_interval))
            .map_err(|e| WorkerError::DetectorSpawnFailed(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the detector to finish
    pub fn join(mut self) -> Result<Detection, WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(Detection::Preempted);
        };

        handle.join().map_err(|_| WorkerError::DetectorPanicked)
    }
}

/// Block until the queue drains, then close it
///
/// Returns when the queue is closed, by this call or by anyone else.
pub fn detect<T>(queue: &TokenQueue<T>, poll_interval: Duration) -> Detection {
    let start = Instant::now();

    loop {
        match queue.wait_for_quiescence(poll_interval) {
            Quiescence::Closed => {
                debug!(reason = ?queue.close_reason(), "Queue closed elsewhere, detector exiting");
                return Detection::Preempted;
            }
            Quiescence::Pending { pending, queued } => {
                debug!(
                    pending,
                    queued,
                    active = queue.stats().active_workers(),
                    "Fetch in progress"
                );
            }
            Quiescence::Drained => {
                // Re-checked under the queue lock; a lost race just loops
                if queue.close_if_drained() {
                    let waited = start.elapsed();
                    info!(
                        waited_ms = waited.as_millis() as u64,
                        "All pages fetched, token queue closed"
                    );
                    return Detection::Drained { waited };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::page::PageToken;
    use crate::pager::queue::CloseReason;

    const TICK: Duration = Duration::from_millis(10);

    #[test]
    fn test_detect_idle_queue() {
        let queue: TokenQueue<u32> = TokenQueue::new(4);

        assert!(matches!(detect(&queue, TICK), Detection::Drained { .. }));
        assert_eq!(queue.close_reason(), Some(CloseReason::Drained));
        assert_eq!(queue.stats().close_count(), 1);
    }

    #[test]
    fn test_detect_preempted() {
        let queue: TokenQueue<u32> = TokenQueue::new(4);
        queue.seed();
        queue.close(CloseReason::Aborted);

        assert_eq!(detect(&queue, TICK), Detection::Preempted);
        assert_eq!(queue.stats().close_count(), 1);
    }

    #[test]
    fn test_detector_waits_for_follow_on_work() {
        let queue: TokenQueue<u32> = TokenQueue::new(4);
        queue.seed();

        let detection = thread::scope(|scope| {
            let detector = TerminationDetector::spawn(scope, &queue, TICK).unwrap();

            // Hold each lease past several heartbeats, chaining two pages
            let lease = queue.pop(TICK).unwrap();
            thread::sleep(TICK * 5);
            assert!(queue.is_open());
            queue.push(PageToken::Resume(1));
            drop(lease);

            let lease = queue.pop(TICK).unwrap();
            thread::sleep(TICK * 5);
            assert!(queue.is_open());
            drop(lease);

            detector.join().unwrap()
        });

        assert!(matches!(detection, Detection::Drained { .. }));
        assert!(!queue.is_open());
        assert_eq!(queue.stats().close_count(), 1);
    }
}
