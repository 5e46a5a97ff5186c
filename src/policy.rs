//! Lock policy and the preferences boundary.
//!
//! The policy is owned by an external preferences collaborator; the
//! coordinator re-reads it at every timeout evaluation rather than caching
//! it, since it may change between evaluations.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default values for LockPolicy
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60 * 5); // 5 minutes

/// What causes the cached secret to be cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTrigger {
    /// Clear after a period of device inactivity
    Timeout,

    /// Clear as soon as the device becomes inactive
    Immediate,

    /// Clear only on explicit request
    Manual,
}

impl LockTrigger {
    /// True when expiration is driven by the inactivity timeout
    pub fn is_timeout(self) -> bool {
        matches!(self, LockTrigger::Timeout)
    }
}

/// Policy governing when the cached secret is cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Whether automatic locking is enabled at all
    pub lock_enabled: bool,

    /// What causes a lock
    pub trigger: LockTrigger,

    /// Inactivity period before a timeout-triggered lock, in seconds
    pub timeout_seconds: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            lock_enabled: false,
            trigger: LockTrigger::Timeout,
            timeout_seconds: DEFAULT_LOCK_TIMEOUT.as_secs(),
        }
    }
}

impl LockPolicy {
    /// Creates a new LockPolicy with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables automatic locking
    pub fn with_lock_enabled(mut self, enabled: bool) -> Self {
        self.lock_enabled = enabled;
        self
    }

    /// Sets the lock trigger mode
    pub fn with_trigger(mut self, trigger: LockTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the inactivity timeout
    ///
    /// This defines how long the device must remain inactive before a
    /// timeout-triggered lock fires. Default is 5 minutes.
    ///
    /// # Example
    /// ```
    /// use secretcache::policy::LockPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = LockPolicy::new()
    ///     .with_lock_enabled(true)
    ///     .with_timeout(Duration::from_secs(60)); // 1 minute
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs();
        self
    }

    /// The inactivity timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Read-only boundary to the host's persisted preferences.
///
/// Implementations must return the current values on every call; the
/// coordinator never caches the result.
pub trait PreferencesProvider: Send + Sync {
    /// Returns the current lock policy
    fn lock_policy(&self) -> LockPolicy;
}

/// A preferences provider backed by in-process memory.
///
/// Useful as a default for hosts without persisted settings, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    policy: RwLock<LockPolicy>,
}

impl InMemoryPreferences {
    /// Creates a provider serving the given policy
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// Replaces the served policy; takes effect at the next evaluation
    pub fn set_policy(&self, policy: LockPolicy) {
        *self.policy.write() = policy;
    }
}

impl PreferencesProvider for InMemoryPreferences {
    fn lock_policy(&self) -> LockPolicy {
        self.policy.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryPreferences, LockPolicy, LockTrigger, PreferencesProvider};
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let policy = LockPolicy::default();
        assert!(!policy.lock_enabled);
        assert_eq!(policy.trigger, LockTrigger::Timeout);
        assert_eq!(policy.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_builders() {
        let policy = LockPolicy::new()
            .with_lock_enabled(true)
            .with_trigger(LockTrigger::Manual)
            .with_timeout(Duration::from_secs(90));

        assert!(policy.lock_enabled);
        assert_eq!(policy.trigger, LockTrigger::Manual);
        assert_eq!(policy.timeout_seconds, 90);
    }

    #[test]
    fn test_trigger_is_timeout() {
        assert!(LockTrigger::Timeout.is_timeout());
        assert!(!LockTrigger::Immediate.is_timeout());
        assert!(!LockTrigger::Manual.is_timeout());
    }

    #[test]
    fn test_policy_from_json() {
        let policy: LockPolicy = serde_json::from_str(
            r#"{"lock_enabled":true,"trigger":"timeout","timeout_seconds":60}"#,
        )
        .unwrap();

        assert!(policy.lock_enabled);
        assert!(policy.trigger.is_timeout());
        assert_eq!(policy.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_in_memory_provider_serves_fresh_values() {
        let preferences = InMemoryPreferences::new(LockPolicy::new());
        assert!(!preferences.lock_policy().lock_enabled);

        preferences.set_policy(LockPolicy::new().with_lock_enabled(true));
        assert!(preferences.lock_policy().lock_enabled);
    }
}
