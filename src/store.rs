//! Exclusive holder of the cached master secret.
//!
//! The store serializes every operation through a single mutex so a reader
//! can never retrieve a secret that is concurrently being destroyed. The
//! transitional `Locking` state makes `is_locked()` report true as soon as a
//! clear has been accepted, before destruction of the material completes.

use crate::error::{Error, Result};
use crate::secret::MasterSecret;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lock state of the process-wide secret cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Secret present and usable
    Unlocked,

    /// A clear was accepted; destruction of the secret is in flight
    Locking,

    /// No secret present
    Locked,
}

/// Point-in-time snapshot of the cache, for status surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Current lock state
    pub state: LockState,

    /// Wall-clock time the secret was cached, while one is present
    pub cached_at: Option<DateTime<Utc>>,
}

/// Slot holding the authoritative secret instance. The payload is private so
/// no caller can observe the secret outside the `Unlocked` state.
enum Slot {
    Unlocked(MasterSecret),
    Locking(MasterSecret),
    Locked,
}

struct StoreInner {
    slot: Slot,
    cached_at: Option<DateTime<Utc>>,
}

/// Thread-safe store for the single cached master secret.
///
/// All operations are atomic with respect to each other; the store is the
/// only synchronization domain for secret mutation.
pub struct SecretStore {
    inner: Mutex<StoreInner>,
}

impl SecretStore {
    /// Creates an empty store in the `Locked` state
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                slot: Slot::Locked,
                cached_at: None,
            }),
        }
    }

    /// Atomically replaces the cached secret and transitions to `Unlocked`.
    ///
    /// Any prior secret instance is dropped, which wipes its material. The
    /// caller remains responsible for anything it held on to.
    pub fn set_secret(&self, secret: MasterSecret) {
        let mut inner = self.inner.lock();
        inner.slot = Slot::Unlocked(secret);
        inner.cached_at = Some(Utc::now());
        log::debug!("master secret cached");
    }

    /// Returns an independent copy of the cached secret.
    ///
    /// # Errors
    ///
    /// * `Error::NotAvailable` - unless the state is `Unlocked`
    pub fn get_secret(&self) -> Result<MasterSecret> {
        match &self.inner.lock().slot {
            Slot::Unlocked(secret) => Ok(secret.clone()),
            _ => Err(Error::NotAvailable),
        }
    }

    /// True iff the state is `Locking` or `Locked`
    pub fn is_locked(&self) -> bool {
        !matches!(self.inner.lock().slot, Slot::Unlocked(_))
    }

    /// Accepts a clear request: `Unlocked` flips to `Locking` and
    /// `is_locked()` becomes true immediately, before the secret is
    /// destroyed.
    ///
    /// Returns false (and changes nothing) when no usable secret is present,
    /// which makes duplicate clear requests no-ops.
    pub fn begin_locking(&self) -> bool {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.slot, Slot::Locked) {
            Slot::Unlocked(secret) => {
                inner.slot = Slot::Locking(secret);
                log::debug!("lock transition started");
                true
            }
            other => {
                inner.slot = other;
                false
            }
        }
    }

    /// Synchronously destroys any held secret and transitions to `Locked`,
    /// resetting the locking flag. Calling this when already `Locked` is a
    /// no-op.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.slot, Slot::Locked) {
            Slot::Unlocked(secret) | Slot::Locking(secret) => {
                secret.close();
                inner.cached_at = None;
                log::info!("master secret cleared");
            }
            Slot::Locked => {}
        }
    }

    /// Returns the current lock state
    pub fn state(&self) -> LockState {
        match self.inner.lock().slot {
            Slot::Unlocked(_) => LockState::Unlocked,
            Slot::Locking(_) => LockState::Locking,
            Slot::Locked => LockState::Locked,
        }
    }

    /// Wall-clock time the current secret was cached, if one is present
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().cached_at
    }

    /// Consistent snapshot of state and cache time
    pub fn status(&self) -> CacheStatus {
        let inner = self.inner.lock();
        let state = match inner.slot {
            Slot::Unlocked(_) => LockState::Unlocked,
            Slot::Locking(_) => LockState::Locking,
            Slot::Locked => LockState::Locked,
        };

        CacheStatus {
            state,
            cached_at: inner.cached_at,
        }
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("state", &self.state())
            .finish()
    }
}
