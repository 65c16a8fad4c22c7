//! Cancellable scheduled tasks.
//!
//! Aborting a Tokio task only takes effect at its next suspension point, so a
//! task that is already past its last `.await` can still mutate state after
//! `abort()` returns. Every scheduled task therefore carries a
//! [`CancelToken`]: the owner sets it while holding the lock the task mutates
//! under, and the task re-checks it after acquiring that lock.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::MeteringError;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True when both tokens came from the same `new()`
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// A spawned task paired with its cancellation token.
///
/// Dropping the task cancels it.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `task` on the current Tokio runtime
    ///
    /// # Errors
    /// `NoRuntime` when called outside a runtime context.
    pub fn spawn<F, Fut>(task: F) -> Result<Self, MeteringError>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| MeteringError::NoRuntime)?;
        let token = CancelToken::new();
        let handle = runtime.spawn(task(token.clone()));
        Ok(Self { token, handle })
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
