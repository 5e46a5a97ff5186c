//! Device-presence signals consumed by the coordinator.
//!
//! Presence events arrive in real-time order but with no debounce guarantee;
//! the coordinator's idempotent schedule/cancel operations absorb duplicate
//! deliveries of the same kind.

use crate::coordinator::LockCoordinator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Presence signals produced by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The device left a user-interactive state (e.g. screen off)
    BecameInactive,

    /// The user is present again (e.g. re-authenticated)
    BecameActive,
}

/// Query for the device's current presence state
pub trait PresenceSource: Send + Sync {
    /// Whether the device is currently in an inactive presence state
    fn is_inactive(&self) -> bool;
}

/// Presence state updated by the host, shared with the coordinator.
///
/// The default state is active.
#[derive(Debug, Default)]
pub struct SharedPresenceState {
    inactive: AtomicBool,
}

impl SharedPresenceState {
    /// Creates a state reporting the device as active
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the device's presence state
    pub fn set_inactive(&self, inactive: bool) {
        self.inactive.store(inactive, Ordering::SeqCst);
    }
}

impl PresenceSource for SharedPresenceState {
    fn is_inactive(&self) -> bool {
        self.inactive.load(Ordering::SeqCst)
    }
}

/// Adapter forwarding presence events to the coordinator.
///
/// The monitor consumes events only while it is running; `stop` (or drop)
/// unregisters it. It holds the coordinator weakly, so it also winds down
/// once the coordinator is gone.
pub struct PresenceMonitor {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceMonitor {
    /// Starts consuming `events` and forwarding them to `coordinator`
    pub fn start(
        runtime: &Handle,
        coordinator: &Arc<LockCoordinator>,
        mut events: mpsc::Receiver<PresenceEvent>,
    ) -> Self {
        let weak = Arc::downgrade(coordinator);

        let task = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };

                log::debug!("presence event: {:?}", event);
                match event {
                    PresenceEvent::BecameInactive => coordinator.device_inactive(),
                    PresenceEvent::BecameActive => coordinator.device_active(),
                }
            }
        });

        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Stops consuming presence events
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            log::debug!("presence monitor stopped");
        }
    }

    /// Whether the monitor is still consuming events
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PresenceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceMonitor")
            .field("running", &self.is_running())
            .finish()
    }
}
