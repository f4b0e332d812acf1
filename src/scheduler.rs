//! Deferred-execution boundary.
//!
//! Background revalidations and deferred cache writes must outlive the
//! sub-request that triggered them. The host environment decides how:
//! a server runtime spawns a task, an edge runtime hands the future to
//! its own keep-alive hook. Scheduled futures carry their own error
//! handling; a failed background task is logged and reported through
//! the event sink, never surfaced to the foreground request.

use futures::future::BoxFuture;

/// Hook that schedules work to continue after the caller has returned.
pub trait TaskScheduler: Send + Sync {
    /// Schedule `task` to run detached from the current request.
    ///
    /// Implementations must not await the task; the caller's response
    /// is already on its way out.
    fn wait_until(&self, task: BoxFuture<'static, ()>);
}

/// Default scheduler backed by the tokio runtime.
///
/// Spawned tasks survive the calling request but not process teardown;
/// a write racing shutdown is lost, which is acceptable best-effort
/// behavior for a cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}
