//! One-shot expiration alarm abstraction.
//!
//! The scheduler is a dumb deferred-callback mechanism: it neither knows nor
//! enforces the at-most-one-outstanding discipline, which belongs to the
//! [`LockCoordinator`](crate::coordinator::LockCoordinator)'s pending flag.
//! Deadlines are monotonic instants, immune to wall-clock adjustments.

use crate::error::Result;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback delivered when a scheduled expiration fires
pub type ExpireCallback = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction over OS-level deferred callback delivery.
///
/// Implementations must be wake-capable: the callback has to be delivered
/// even while the host is otherwise idle, since the whole point is to clear
/// secrets when the application is not actively running.
pub trait ExpirationScheduler: Send + Sync {
    /// Registers a one-shot alarm that invokes `on_expire` at `at`.
    ///
    /// # Errors
    ///
    /// * `Error::Scheduler` - if the host refuses the registration
    fn schedule(&self, at: Instant, on_expire: ExpireCallback) -> Result<()>;

    /// Requests cancellation of the outstanding alarm. Safe to call when
    /// none is pending.
    fn cancel(&self);
}

/// Expiration scheduler backed by a tokio timer task.
///
/// `schedule` spawns a task that sleeps until the deadline and then invokes
/// the callback; `cancel` aborts it. A new registration replaces any
/// previous one.
pub struct TokioExpirationScheduler {
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokioExpirationScheduler {
    /// Creates a scheduler that spawns its timer tasks on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            task: Mutex::new(None),
        }
    }
}

impl ExpirationScheduler for TokioExpirationScheduler {
    fn schedule(&self, at: Instant, on_expire: ExpireCallback) -> Result<()> {
        let mut task = self.task.lock();

        if let Some(previous) = task.take() {
            previous.abort();
        }

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(at).await;
            log::debug!("expiration alarm fired");
            on_expire();
        });

        *task = Some(handle);
        Ok(())
    }

    fn cancel(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TokioExpirationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioExpirationScheduler")
            .field("pending", &self.task.lock().is_some())
            .finish()
    }
}
