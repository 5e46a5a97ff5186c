//! # Secret Cache Manager
//!
//! A library for caching a single sensitive master secret in memory with
//! automatic, event-driven expiration.
//!
//! `secretcache` holds the master secret for as long as the application is
//! unlocked and guarantees it is never retained longer than policy allows.
//! A small state machine (the [`LockCoordinator`]) reacts to cache/clear
//! requests and device-presence signals, drives a single wake-capable
//! expiration timeout, and announces lock transitions to authorized
//! observers over a permissioned broadcast.
//!
//! ## Features
//!
//! - **Exclusive secret ownership**: the authoritative [`MasterSecret`]
//!   lives only in the [`SecretStore`]; readers get independent copies
//! - **Immediate lock visibility**: `is_locked()` flips true the moment a
//!   clear is accepted, before destruction of the material completes
//! - **Idempotent scheduling**: duplicate presence signals or clear
//!   requests are absorbed, never compounded
//! - **Monotonic deadlines**: expiration is computed on a monotonic clock,
//!   immune to wall-clock adjustments
//! - **Permissioned events**: only holders of the cache [`AccessToken`]
//!   can observe `SecretCleared` broadcasts
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use secretcache::{
//!     AccessToken, BroadcastNotifier, CacheEvent, InMemoryPreferences, LockCoordinator,
//!     LockPolicy, LockTrigger, MasterSecret, NoUpgradeGuard, NoopStatusRefresher,
//!     SecretStore, SharedPresenceState, TokioExpirationScheduler,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> secretcache::Result<()> {
//!     let runtime = tokio::runtime::Handle::current();
//!
//!     let store = Arc::new(SecretStore::new());
//!     let scheduler = Arc::new(TokioExpirationScheduler::new(runtime.clone()));
//!     let notifier = Arc::new(BroadcastNotifier::new(AccessToken::generate()?));
//!     let preferences = Arc::new(InMemoryPreferences::new(
//!         LockPolicy::new()
//!             .with_lock_enabled(true)
//!             .with_trigger(LockTrigger::Timeout)
//!             .with_timeout(Duration::from_secs(60)),
//!     ));
//!     let presence = Arc::new(SharedPresenceState::new());
//!
//!     let coordinator = LockCoordinator::new(
//!         store,
//!         scheduler,
//!         notifier.clone(),
//!         Arc::new(NoopStatusRefresher::new()),
//!         preferences,
//!         presence.clone(),
//!         Arc::new(NoUpgradeGuard::new()),
//!         runtime,
//!     );
//!
//!     // Unlock succeeded elsewhere; arm the cache.
//!     let mut material = vec![0_u8; secretcache::MASTER_SECRET_SIZE];
//!     coordinator.dispatch(CacheEvent::CacheSecret(MasterSecret::new(&mut material)));
//!
//!     // Screen went off; the expiration timeout arms per policy.
//!     presence.set_inactive(true);
//!     coordinator.dispatch(CacheEvent::DeviceBecameInactive);
//!
//!     assert!(!coordinator.is_locked());
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod notifier;
pub mod policy;
pub mod presence;
pub mod scheduler;
pub mod secret;
pub mod store;

// Re-export key types
pub use crate::coordinator::{CacheEvent, LockCoordinator};
pub use crate::error::{Error, Result};
pub use crate::notifier::{AccessToken, BroadcastNotifier, LockEvent, LockEventNotifier};
pub use crate::policy::{InMemoryPreferences, LockPolicy, LockTrigger, PreferencesProvider};
pub use crate::presence::{PresenceEvent, PresenceMonitor, PresenceSource, SharedPresenceState};
pub use crate::scheduler::{ExpirationScheduler, ExpireCallback, TokioExpirationScheduler};
pub use crate::secret::MasterSecret;
pub use crate::store::{CacheStatus, LockState, SecretStore};

/// Size in bytes of a generated master secret
pub const MASTER_SECRET_SIZE: usize = 32;

use async_trait::async_trait;

/// Collaborator surfacing cache status to the user.
///
/// Failures here are logged by the coordinator and never alter or block a
/// lock transition.
#[async_trait]
pub trait StatusRefresher: Send + Sync {
    /// Shows or hides the persistent "secret cached" indicator
    fn set_cached_indicator(&self, visible: bool) -> Result<()>;

    /// Refreshes downstream notifications after the secret was cached
    async fn refresh(&self) -> Result<()>;

    /// Clears downstream notifications after the secret was cleared
    async fn clear_all(&self) -> Result<()>;
}

/// A status refresher that does nothing
#[derive(Debug, Default)]
pub struct NoopStatusRefresher;

impl NoopStatusRefresher {
    /// Create a new no-op refresher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StatusRefresher for NoopStatusRefresher {
    fn set_cached_indicator(&self, _visible: bool) -> Result<()> {
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        Ok(())
    }
}

/// Guard predicate consulted before mutating the cache.
///
/// While an upgrade is in progress, clear requests are dropped entirely and
/// the cache-path notification refresh is suppressed, so the secret cannot
/// be pulled out from under a schema/data migration that needs it.
pub trait UpgradeGuard: Send + Sync {
    /// True while a schema/data upgrade is running
    fn upgrade_in_progress(&self) -> bool;
}

/// An upgrade guard for hosts that never run migrations
#[derive(Debug, Default)]
pub struct NoUpgradeGuard;

impl NoUpgradeGuard {
    /// Create a new guard that always reports no upgrade
    pub fn new() -> Self {
        Self
    }
}

impl UpgradeGuard for NoUpgradeGuard {
    fn upgrade_in_progress(&self) -> bool {
        false
    }
}
