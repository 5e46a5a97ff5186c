//! The lock coordinator: orchestrates the secret cache state machine.
//!
//! The coordinator is the sole driver of lock transitions. It reacts to
//! cache/clear requests and presence signals, arms and cancels the single
//! expiration timeout, and announces transitions to authorized observers.
//! One instance exists per process, created at the composition root and
//! passed by shared reference to every event-producing collaborator.

use crate::error::Result;
use crate::notifier::LockEventNotifier;
use crate::policy::PreferencesProvider;
use crate::presence::PresenceSource;
use crate::scheduler::ExpirationScheduler;
use crate::secret::MasterSecret;
use crate::store::{CacheStatus, LockState, SecretStore};
use crate::{StatusRefresher, UpgradeGuard};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Events consumed by the coordinator
#[derive(Debug)]
pub enum CacheEvent {
    /// Arms the cache with a newly obtained master secret
    CacheSecret(MasterSecret),

    /// Explicit lock request, or a scheduled expiration firing
    RequestClear,

    /// The device left a user-interactive state
    DeviceBecameInactive,

    /// The user is present again
    DeviceBecameActive,

    /// The host locale changed; display-only effect
    LocaleChanged,
}

/// Coordinates the cached master secret's lifecycle.
///
/// Entry points may be invoked concurrently from independent callers (the
/// request path, the timer callback, presence callbacks); secret mutation is
/// serialized by the [`SecretStore`], and the pending-timeout flag has its
/// own lock.
pub struct LockCoordinator {
    store: Arc<SecretStore>,
    scheduler: Arc<dyn ExpirationScheduler>,
    notifier: Arc<dyn LockEventNotifier>,
    refresher: Arc<dyn StatusRefresher>,
    preferences: Arc<dyn PreferencesProvider>,
    presence: Arc<dyn PresenceSource>,
    upgrade: Arc<dyn UpgradeGuard>,
    runtime: Handle,

    /// At most one scheduled expiration is outstanding at a time
    pending_alarm: Mutex<bool>,

    /// Handle to self for the expiration callback
    weak_self: Weak<LockCoordinator>,
}

impl LockCoordinator {
    /// Creates the coordinator. Call once from the composition root.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SecretStore>,
        scheduler: Arc<dyn ExpirationScheduler>,
        notifier: Arc<dyn LockEventNotifier>,
        refresher: Arc<dyn StatusRefresher>,
        preferences: Arc<dyn PreferencesProvider>,
        presence: Arc<dyn PresenceSource>,
        upgrade: Arc<dyn UpgradeGuard>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            scheduler,
            notifier,
            refresher,
            preferences,
            presence,
            upgrade,
            runtime,
            pending_alarm: Mutex::new(false),
            weak_self: weak.clone(),
        })
    }

    /// Dispatches an event to its handler
    pub fn dispatch(&self, event: CacheEvent) {
        log::debug!("dispatch: {:?}", event);

        match event {
            CacheEvent::CacheSecret(secret) => self.handle_cache(secret),
            CacheEvent::RequestClear => self.handle_clear(),
            CacheEvent::DeviceBecameInactive => self.device_inactive(),
            CacheEvent::DeviceBecameActive => self.device_active(),
            CacheEvent::LocaleChanged => self.handle_locale_changed(),
        }
    }

    /// Arms the cache after a successful unlock.
    ///
    /// If the device is already inactive the expiration timeout is evaluated
    /// immediately, so a secret cached behind a locked screen still expires.
    pub fn handle_cache(&self, secret: MasterSecret) {
        log::info!("caching master secret");

        self.store.set_secret(secret);
        metrics::counter!("scm.secret.cached").increment(1);

        self.update_cached_indicator();

        if self.presence.is_inactive() {
            self.start_timeout_if_appropriate();
        }

        // Refresh downstream notifications off the request path; skipped
        // while a data upgrade is running.
        let refresher = Arc::clone(&self.refresher);
        let upgrade = Arc::clone(&self.upgrade);
        self.runtime.spawn(async move {
            if upgrade.upgrade_in_progress() {
                log::debug!("upgrade in progress; skipping notification refresh");
                return;
            }

            if let Err(e) = refresher.refresh().await {
                log::warn!("notification refresh failed: {}", e);
            }
        });
    }

    /// Clears the cached secret, either on explicit request or because a
    /// scheduled expiration fired.
    ///
    /// The store flips to `Locking` synchronously, so `is_locked()` is true
    /// the moment this returns; destruction of the material runs in the
    /// background. Duplicate requests are no-ops and produce no broadcast.
    pub fn handle_clear(&self) {
        log::info!("clear requested");

        if self.upgrade.upgrade_in_progress() {
            log::warn!("cannot clear secret during upgrade");
            return;
        }

        *self.pending_alarm.lock() = false;

        if !self.store.begin_locking() {
            log::debug!("secret already locked; ignoring clear request");
            return;
        }
        metrics::counter!("scm.secret.cleared").increment(1);

        if let Err(e) = self.notifier.secret_cleared() {
            log::warn!("secret-cleared broadcast failed: {}", e);
        }

        let store = Arc::clone(&self.store);
        let refresher = Arc::clone(&self.refresher);
        self.runtime.spawn(async move {
            if let Err(e) = refresher.clear_all().await {
                log::warn!("failed to clear notifications: {}", e);
            }

            store.clear();
        });
    }

    /// The device left a user-interactive state
    pub fn device_inactive(&self) {
        self.start_timeout_if_appropriate();
    }

    /// The user is present again
    pub fn device_active(&self) {
        self.cancel_timeout();
    }

    /// Re-derives locale-dependent presentation; lock state is unaffected
    pub fn handle_locale_changed(&self) {
        self.update_cached_indicator();
    }

    /// Arms the expiration timeout iff the cache is unlocked and the current
    /// policy calls for timeout-based locking; otherwise cancels any pending
    /// timeout so a stale timer never outlives a policy change.
    ///
    /// The policy is re-read on every evaluation.
    pub(crate) fn start_timeout_if_appropriate(&self) {
        let policy = self.preferences.lock_policy();

        if !self.store.is_locked() && policy.lock_enabled && policy.trigger.is_timeout() {
            self.schedule_timeout(policy.timeout());
        } else {
            self.cancel_timeout();
        }
    }

    /// Registers the one-shot expiration alarm. No-op while one is already
    /// pending, so repeated inactive signals cannot drift the fire time.
    pub(crate) fn schedule_timeout(&self, timeout: Duration) {
        let mut pending = self.pending_alarm.lock();
        if *pending {
            return;
        }

        log::info!("starting timeout: {} s", timeout.as_secs());

        let at = Instant::now() + timeout;
        let weak = self.weak_self.clone();
        let result = self.scheduler.schedule(
            at,
            Box::new(move || {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.dispatch(CacheEvent::RequestClear);
                }
            }),
        );

        match result {
            Ok(()) => {
                *pending = true;
                metrics::counter!("scm.timeout.armed").increment(1);
            }
            // A lost alarm leaves the secret cached; the next presence
            // signal re-evaluates.
            Err(e) => log::error!("failed to register expiration alarm: {}", e),
        }
    }

    /// Unconditionally cancels the scheduled alarm; safe when none is
    /// pending
    pub(crate) fn cancel_timeout(&self) {
        self.scheduler.cancel();

        let mut pending = self.pending_alarm.lock();
        if *pending {
            metrics::counter!("scm.timeout.canceled").increment(1);
        }
        *pending = false;

        log::info!("timeout canceled");
    }

    /// Whether an expiration alarm is currently armed
    pub fn timeout_pending(&self) -> bool {
        *self.pending_alarm.lock()
    }

    /// True iff no usable secret is present
    pub fn is_locked(&self) -> bool {
        self.store.is_locked()
    }

    /// Returns an independent copy of the cached secret.
    ///
    /// # Errors
    ///
    /// * `Error::NotAvailable` - when the cache is locked; the caller must
    ///   prompt for an unlock
    pub fn get_secret(&self) -> Result<MasterSecret> {
        self.store.get_secret()
    }

    /// Snapshot of the cache for status surfaces
    pub fn status(&self) -> CacheStatus {
        self.store.status()
    }

    /// The underlying store, for collaborators that only query lock state
    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    /// Host-lifecycle teardown: finalizes an in-flight lock so the secret
    /// never outlives the subsystem
    pub fn close(&self) {
        if self.store.state() == LockState::Locking {
            log::warn!("coordinator closing mid-lock; finalizing clear");
            self.store.clear();
        }
    }

    fn update_cached_indicator(&self) {
        let visible = self.preferences.lock_policy().lock_enabled;
        if let Err(e) = self.refresher.set_cached_indicator(visible) {
            log::warn!("failed to update cached-status indicator: {}", e);
        }
    }
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("state", &self.store.state())
            .field("pending_alarm", &self.timeout_pending())
            .finish()
    }
}
