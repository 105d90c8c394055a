//! Bounded continuation-token queue with a pending-work counter
//!
//! The queue pairs a crossbeam bounded channel with a lock-protected
//! pending counter. The counter goes up on every accepted push and down
//! when the [`TokenLease`] for a popped token is dropped. Workers push the
//! follow-on token *before* their lease drops, so `pending == 0` means no
//! token is queued and no fetch is in flight: nothing can produce more
//! work and the queue can be closed.
//!
//! Rejected pushes (queue full, or already closed) never block and never
//! fail the caller. They are logged and counted in [`QueueStats`].

use super::page::PageToken;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default queue capacity (pending continuation tokens)
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Why the queue was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// No token queued and no fetch in flight
    Drained,

    /// A worker failed and the run is being abandoned
    Aborted,

    /// All workers exited and the coordinator is tearing down
    Teardown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Drained => "drained",
            CloseReason::Aborted => "aborted",
            CloseReason::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Result of waiting for the queue to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quiescence {
    /// Pending counter is zero and the queue is still open
    Drained,

    /// Work is still outstanding after the wait
    Pending { pending: usize, queued: usize },

    /// The queue is already closed
    Closed,
}

/// Statistics for the token queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Tokens accepted by push
    pub enqueued: AtomicU64,

    /// Tokens handed out by pop
    pub dequeued: AtomicU64,

    /// Tokens dropped because the queue was full
    pub overflow_drops: AtomicU64,

    /// Tokens dropped because the queue was already closed
    pub closed_drops: AtomicU64,

    /// Queued tokens discarded when the queue was closed
    pub abandoned: AtomicU64,

    /// Number of times the queue transitioned to closed (0 or 1)
    pub closes: AtomicU64,

    /// Highest observed queue length
    pub peak_len: AtomicUsize,

    /// Workers currently holding a lease
    pub active: AtomicUsize,
}

impl QueueStats {
    /// Tokens lost to overflow or a closed queue
    pub fn dropped(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed) + self.closed_drops.load(Ordering::Relaxed)
    }

    /// Number of workers mid-fetch
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of completed closes
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

struct QueueState<T> {
    /// Present while the queue is open; dropping it disconnects `pop`
    sender: Option<Sender<PageToken<T>>>,

    /// Queued tokens plus outstanding leases
    pending: usize,

    close_reason: Option<CloseReason>,
}

/// Bounded queue of continuation tokens shared by all workers
pub struct TokenQueue<T> {
    receiver: Receiver<PageToken<T>>,
    state: Mutex<QueueState<T>>,
    drained: Condvar,
    capacity: usize,
    stats: QueueStats,
}

impl<T> TokenQueue<T> {
    /// Create an open queue holding at most `capacity` tokens
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);

        Self {
            receiver,
            state: Mutex::new(QueueState {
                sender: Some(sender),
                pending: 0,
                close_reason: None,
            }),
            drained: Condvar::new(),
            capacity,
            stats: QueueStats::default(),
        }
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued tokens
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if no token is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Queued tokens plus in-flight leases
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Check if the queue still accepts tokens
    pub fn is_open(&self) -> bool {
        self.state.lock().sender.is_some()
    }

    /// Why the queue was closed, if it was
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().close_reason
    }

    /// Get queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Take the next token, waiting up to `timeout`
    ///
    /// Returns `None` on timeout, or once the queue is closed and empty.
    /// The returned lease keeps the token counted as pending until it is
    /// dropped.
    pub fn pop(&self, timeout: Duration) -> Option<TokenLease<'_, T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(token) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                self.stats.active.fetch_add(1, Ordering::SeqCst);
                Some(TokenLease { queue: self, token })
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Close the queue
    ///
    /// Idempotent: only the first call closes and returns `true`. Tokens
    /// still queued are discarded, and every blocked `pop` returns `None`.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.state.lock();
        self.close_locked(&mut state, reason)
    }

    /// Close the queue only if no work is outstanding
    ///
    /// The emptiness check and the close happen under one lock, so no push
    /// can land in between.
    pub fn close_if_drained(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending != 0 || state.sender.is_none() {
            return false;
        }
        self.close_locked(&mut state, CloseReason::Drained)
    }

    /// Block until the pending counter reaches zero, the queue closes, or
    /// `timeout` elapses
    pub fn wait_for_quiescence(&self, timeout: Duration) -> Quiescence {
        let mut state = self.state.lock();

        if state.sender.is_some() && state.pending != 0 {
            let _ = self.drained.wait_for(&mut state, timeout);
        }

        if state.sender.is_none() {
            Quiescence::Closed
        } else if state.pending == 0 {
            Quiescence::Drained
        } else {
            Quiescence::Pending {
                pending: state.pending,
                queued: self.receiver.len(),
            }
        }
    }

    fn close_locked(&self, state: &mut QueueState<T>, reason: CloseReason) -> bool {
        let Some(sender) = state.sender.take() else {
            return false;
        };
        drop(sender);
        state.close_reason = Some(reason);

        let abandoned = self.receiver.try_iter().count();
        if abandoned > 0 {
            state.pending = state.pending.saturating_sub(abandoned);
            self.stats
                .abandoned
                .fetch_add(abandoned as u64, Ordering::Relaxed);
            debug!(abandoned, reason = %reason, "Discarded queued tokens on close");
        }

        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.drained.notify_all();
        debug!(reason = %reason, "Token queue closed");
        true
    }

    fn complete(&self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }
}

impl<T: fmt::Debug> TokenQueue<T> {
    /// Seed the queue with the first-page token
    pub fn seed(&self) -> bool {
        self.push(PageToken::Start)
    }

    /// Add a token to the queue without blocking
    ///
    /// Returns `false` if the queue is full or closed. The token is lost in
    /// that case; the loss is logged and counted.
    pub fn push(&self, token: PageToken<T>) -> bool {
        let mut state = self.state.lock();

        let Some(sender) = state.sender.as_ref() else {
            self.stats.closed_drops.fetch_add(1, Ordering::Relaxed);
            match state.close_reason {
                Some(CloseReason::Aborted) => {
                    debug!(token = ?token, "Queue closed after failure, dropping token");
                }
                reason => {
                    warn!(
                        token = ?token,
                        reason = ?reason,
                        "Queue already closed, continuation token dropped"
                    );
                }
            }
            return false;
        };

        match sender.try_send(token) {
            Ok(()) => {
                state.pending += 1;
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .peak_len
                    .fetch_max(self.receiver.len(), Ordering::Relaxed);
                trace!(pending = state.pending, "Token queued");
                true
            }
            Err(TrySendError::Full(token)) => {
                self.stats.overflow_drops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    token = ?token,
                    capacity = self.capacity,
                    "Token queue full, continuation token dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(token)) => {
                self.stats.closed_drops.fetch_add(1, Ordering::Relaxed);
                warn!(token = ?token, "Token queue disconnected, continuation token dropped");
                false
            }
        }
    }
}

/// A popped token that still counts as pending work
///
/// Dropping the lease marks the worker idle and releases the pending
/// credit. Push any follow-on token before dropping it.
pub struct TokenLease<'a, T> {
    queue: &'a TokenQueue<T>,
    token: PageToken<T>,
}

impl<'a, T> TokenLease<'a, T> {
    /// The leased token
    pub fn token(&self) -> &PageToken<T> {
        &self.token
    }
}

impl<'a, T> Drop for TokenLease<'a, T> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}
