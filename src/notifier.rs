//! Permissioned lock-event broadcast.
//!
//! When the secret becomes unavailable, other components in the same trust
//! boundary are told so they can drop derived state. Delivery is gated by a
//! shared-secret capability token and is best effort; no acknowledgment is
//! awaited and a failed delivery never blocks a lock transition.

use crate::error::{Error, Result};
use subtle::ConstantTimeEq;
use tokio::sync::broadcast;

/// Buffered capacity of the lock-event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Size of a capability token in bytes
pub const ACCESS_TOKEN_SIZE: usize = 32;

/// Events announced to authorized components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    /// The master secret became unavailable
    SecretCleared,
}

/// Shared-secret capability gating lock-event subscriptions.
///
/// Only holders of a matching token may subscribe; comparison is constant
/// time.
#[derive(Clone)]
pub struct AccessToken([u8; ACCESS_TOKEN_SIZE]);

impl AccessToken {
    /// Generates a fresh random token
    pub fn generate() -> Result<Self> {
        let mut bytes = [0_u8; ACCESS_TOKEN_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| Error::RandomGenerationFailed(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Reconstructs a token from raw bytes, e.g. one shared at process start
    pub fn from_bytes(bytes: [u8; ACCESS_TOKEN_SIZE]) -> Self {
        Self(bytes)
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for AccessToken {}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"<redacted>").finish()
    }
}

/// Boundary through which the coordinator announces lock transitions
pub trait LockEventNotifier: Send + Sync {
    /// Announces that the secret was cleared. Best effort; implementations
    /// must not block on delivery.
    fn secret_cleared(&self) -> Result<()>;
}

/// In-process notifier delivering [`LockEvent`]s over a broadcast channel.
///
/// Subscription requires the access token handed out by the composition
/// root; components without it cannot observe lock transitions.
pub struct BroadcastNotifier {
    token: AccessToken,
    sender: broadcast::Sender<LockEvent>,
}

impl BroadcastNotifier {
    /// Creates a notifier guarded by `token`
    pub fn new(token: AccessToken) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { token, sender }
    }

    /// Subscribes to lock events.
    ///
    /// # Errors
    ///
    /// * `Error::PermissionDenied` - if `token` does not match
    pub fn subscribe(&self, token: &AccessToken) -> Result<broadcast::Receiver<LockEvent>> {
        if *token != self.token {
            return Err(Error::PermissionDenied(
                "lock event subscription requires the cache access token".to_string(),
            ));
        }
        Ok(self.sender.subscribe())
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl LockEventNotifier for BroadcastNotifier {
    fn secret_cleared(&self) -> Result<()> {
        log::info!("broadcasting secret-cleared event");

        // a send with no live receivers is not a delivery failure
        if self.sender.send(LockEvent::SecretCleared).is_err() {
            log::debug!("no receivers for secret-cleared event");
        }
        Ok(())
    }
}

impl std::fmt::Debug for BroadcastNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNotifier")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessToken, BroadcastNotifier, LockEvent, LockEventNotifier};
    use crate::error::Error;

    #[test]
    fn test_token_equality() {
        let token = AccessToken::from_bytes([7_u8; 32]);
        assert_eq!(token, AccessToken::from_bytes([7_u8; 32]));
        assert_ne!(token, AccessToken::from_bytes([8_u8; 32]));
    }

    #[test]
    fn test_generated_tokens_are_distinct() {
        let a = AccessToken::generate().unwrap();
        let b = AccessToken::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_subscribe_requires_matching_token() {
        let notifier = BroadcastNotifier::new(AccessToken::from_bytes([1_u8; 32]));

        assert!(notifier
            .subscribe(&AccessToken::from_bytes([1_u8; 32]))
            .is_ok());
        assert!(matches!(
            notifier.subscribe(&AccessToken::from_bytes([2_u8; 32])),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_event_delivery() {
        let token = AccessToken::generate().unwrap();
        let notifier = BroadcastNotifier::new(token.clone());
        let mut receiver = notifier.subscribe(&token).unwrap();

        notifier.secret_cleared().unwrap();
        assert_eq!(receiver.recv().await.unwrap(), LockEvent::SecretCleared);
    }

    #[test]
    fn test_send_without_receivers_is_ok() {
        let notifier = BroadcastNotifier::new(AccessToken::from_bytes([3_u8; 32]));
        assert!(notifier.secret_cleared().is_ok());
    }
}
