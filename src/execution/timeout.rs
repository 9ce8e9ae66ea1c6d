//! Pending Call Module
//!
//! Tracks one submission to the bounded runner: the query, when it was
//! submitted, its deadline, and a cancellation flag.
//!
//! ## Design
//!
//! Cancellation is cooperative. The caller keeps a [`CancelHandle`] and
//! raises it when its deadline passes; the worker owns the [`PendingCall`]
//! and checks it once, right before it starts executing. Work that is
//! already talking to the server keeps running and still fills the cache
//! when it finishes.
//!
//! Time is read from the tokio clock, so a paused test runtime controls
//! expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A unit of work submitted to the runner.
pub struct PendingCall {
    query: Arc<str>,

    /// Cancellation flag (shared with the caller's handle)
    cancelled: Arc<AtomicBool>,

    /// When the call was submitted
    submitted_at: Instant,

    /// How long the caller is willing to wait
    deadline: Duration,
}

impl PendingCall {
    pub fn new(query: &str, deadline: Duration) -> Self {
        PendingCall {
            query: Arc::from(query),
            cancelled: Arc::new(AtomicBool::new(false)),
            submitted_at: Instant::now(),
            deadline,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Get the elapsed time since submission
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.deadline
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The caller has given up, by cancellation or by deadline
    pub fn is_abandoned(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Get a handle that can be used to cancel from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("query", &self.query)
            .field("deadline", &self.deadline)
            .field("elapsed", &self.elapsed())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle for cancelling a pending call from another task
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the associated call
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
