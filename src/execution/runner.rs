//! Bounded Async Runner
//!
//! Wraps the [`MemoizedExecutor`] with a fixed number of workers and a
//! per-call deadline.
//!
//! ## Design
//!
//! A semaphore with `pool_size` permits stands in for the worker pool. Each
//! submission becomes a tokio task that holds a permit while it executes.
//! The caller waits for the task's answer under `tokio::time::timeout`:
//!
//! - If the answer arrives first, the caller gets it.
//! - If the deadline passes first, the caller gets
//!   [`QueryFailure::Timeout`] and the call is flagged as cancelled. A task
//!   that gets its permit after the flag is raised, or after its deadline,
//!   never executes. A task that
//!   already started runs to completion and fills the cache, so a repeat of
//!   the same query can return instantly.
//!
//! Submissions beyond `pool_size` wait in the semaphore's FIFO queue. The
//! queue is unbounded unless `max_queued` is set, in which case overflow is
//! answered with [`QueryFailure::Saturated`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use super::executor::MemoizedExecutor;
use super::timeout::PendingCall;
use crate::connection::ConnectionError;
use crate::result::{QueryFailure, QueryResult};

/// Default number of concurrent executions
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Default per-call deadline
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

struct RunnerInner {
    executor: Arc<MemoizedExecutor>,
    permits: Arc<Semaphore>,
    pool_size: usize,
    default_timeout: Duration,
    /// 0 = unbounded
    max_queued: usize,
    queued: AtomicUsize,
    closing: AtomicBool,
}

/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct BoundedRunner {
    inner: Arc<RunnerInner>,
}

impl BoundedRunner {
    pub fn new(
        executor: Arc<MemoizedExecutor>,
        pool_size: usize,
        default_timeout: Duration,
        max_queued: usize,
    ) -> Self {
        let pool_size = pool_size.max(1);
        BoundedRunner {
            inner: Arc::new(RunnerInner {
                executor,
                permits: Arc::new(Semaphore::new(pool_size)),
                pool_size,
                default_timeout,
                max_queued,
                queued: AtomicUsize::new(0),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Run with the configured default deadline.
    pub async fn run(&self, query: &str) -> Result<QueryResult, ConnectionError> {
        self.run_with_timeout(query, self.inner.default_timeout).await
    }

    /// Run `query` on the pool, waiting at most `deadline` for the answer.
    pub async fn run_with_timeout(
        &self,
        query: &str,
        deadline: Duration,
    ) -> Result<QueryResult, ConnectionError> {
        let inner = &self.inner;
        if inner.closing.load(Ordering::Acquire) {
            return Ok(QueryResult::Failed(QueryFailure::ShutDown));
        }

        let permit = match Arc::clone(&inner.permits).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::Closed) => {
                return Ok(QueryResult::Failed(QueryFailure::ShutDown));
            }
            Err(TryAcquireError::NoPermits) => {
                if let Err(queued) = self.reserve_queue_slot() {
                    warn!(queued, "Query runner saturated, rejecting query");
                    return Ok(QueryResult::Failed(QueryFailure::Saturated { queued }));
                }
                None
            }
        };

        let call = PendingCall::new(query, deadline);
        let cancel = call.cancel_handle();
        let worker = Arc::clone(inner);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let _permit = match permit {
                Some(permit) => permit,
                None => {
                    let acquired = Arc::clone(&worker.permits).acquire_owned().await;
                    worker.queued.fetch_sub(1, Ordering::AcqRel);
                    match acquired {
                        Ok(permit) => permit,
                        Err(_) => return,
                    }
                }
            };
            if call.is_abandoned() {
                debug!(
                    waited_ms = call.elapsed().as_millis() as u64,
                    "skipping query abandoned while queued"
                );
                return;
            }
            let result = worker.executor.execute(call.query()).await;
            // The caller may have stopped waiting; the cache still has the result.
            let _ = tx.send(result);
        });

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            // Worker exited without answering: the pool closed under it
            Ok(Err(_)) => Ok(QueryResult::Failed(QueryFailure::ShutDown)),
            Err(_) => {
                cancel.cancel();
                warn!(
                    deadline_secs = deadline.as_secs_f64(),
                    query,
                    "Query timed out"
                );
                Ok(QueryResult::Failed(QueryFailure::Timeout(deadline)))
            }
        }
    }

    // Err carries the queue length when the bound is reached.
    fn reserve_queue_slot(&self) -> Result<(), usize> {
        let inner = &self.inner;
        if inner.max_queued == 0 {
            inner.queued.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }
        inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < inner.max_queued).then_some(n + 1)
            })
            .map(|_| ())
    }

    /// Stop accepting work and wait for every queued and running task.
    ///
    /// The semaphore is FIFO, so acquiring the whole pool only succeeds
    /// after all earlier waiters have been served and released their permit.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.closing.store(true, Ordering::Release);
        info!(
            active = self.active(),
            queued = self.queued(),
            "Draining query runner"
        );
        let drained = inner.permits.acquire_many(inner.pool_size as u32).await;
        inner.permits.close();
        drop(drained);
        info!("Query runner drained");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Tasks currently holding a worker slot
    pub fn active(&self) -> usize {
        self.inner
            .pool_size
            .saturating_sub(self.inner.permits.available_permits())
    }

    /// Tasks waiting for a worker slot
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    pub fn executor(&self) -> &Arc<MemoizedExecutor> {
        &self.inner.executor
    }
}
