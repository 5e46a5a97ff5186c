//! The master secret value cached by the store.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

/// An opaque, sensitive byte-bearing value obtained once per unlock session.
///
/// The authoritative instance lives in the [`SecretStore`](crate::store::SecretStore);
/// callers that read it receive an independent copy, so mutating or closing a
/// copy never affects the cached instance. Material is wiped on [`close`](Self::close)
/// and again on drop.
pub struct MasterSecret {
    material: RwLock<Option<Zeroizing<Vec<u8>>>>,
}

impl MasterSecret {
    /// Creates a new secret by copying the given material.
    ///
    /// The caller's buffer is zeroized before this returns, so the sensitive
    /// data exists only inside the secret afterwards.
    pub fn new(material: &mut [u8]) -> Self {
        let copy = Zeroizing::new(material.to_vec());
        material.zeroize();

        Self {
            material: RwLock::new(Some(copy)),
        }
    }

    /// Creates a new secret with cryptographically secure random material.
    pub fn generate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::RandomGenerationFailed(
                "cannot generate a zero-length secret".to_string(),
            ));
        }

        let mut material = Zeroizing::new(vec![0_u8; size]);
        getrandom::getrandom(&mut material)
            .map_err(|e| Error::RandomGenerationFailed(e.to_string()))?;

        Ok(Self {
            material: RwLock::new(Some(material)),
        })
    }

    /// Provides temporary, read-only access to the secret material.
    ///
    /// # Errors
    ///
    /// * `Error::SecretClosed` - if the secret has already been destroyed
    pub fn with_bytes<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let guard = self.material.read();
        match guard.as_ref() {
            Some(material) => action(material),
            None => Err(Error::SecretClosed),
        }
    }

    /// Irreversibly destroys the secret, wiping its material.
    ///
    /// Closing an already-closed secret is a no-op.
    pub fn close(&self) {
        let mut guard = self.material.write();
        if guard.take().is_some() {
            log::trace!("master secret material destroyed");
        }
    }

    /// Checks if the secret has been destroyed
    pub fn is_closed(&self) -> bool {
        self.material.read().is_none()
    }

    /// Returns the length of the secret in bytes; zero once closed
    pub fn len(&self) -> usize {
        self.material.read().as_ref().map_or(0, |m| m.len())
    }

    /// Checks if the secret holds no material
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for MasterSecret {
    /// Returns an independent deep copy; the clone's lifetime is detached
    /// from the original.
    fn clone(&self) -> Self {
        let copy = self
            .material
            .read()
            .as_ref()
            .map(|m| Zeroizing::new(m.to_vec()));

        Self {
            material: RwLock::new(copy),
        }
    }
}

impl PartialEq for MasterSecret {
    /// Constant-time comparison of the underlying material.
    fn eq(&self, other: &Self) -> bool {
        let a = self.material.read();
        let b = other.material.read();
        match (a.as_ref(), b.as_ref()) {
            (Some(a), Some(b)) => bool::from(a.as_slice().ct_eq(b.as_slice())),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for MasterSecret {}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("material", &"<hidden>")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::MasterSecret;
    use crate::error::Error;

    #[test]
    fn test_new_wipes_input() {
        let mut material = vec![0xAB_u8; 16];
        let secret = MasterSecret::new(&mut material);

        assert_eq!(material, vec![0_u8; 16]);
        assert_eq!(secret.len(), 16);
        assert!(!secret.is_closed());
    }

    #[test]
    fn test_with_bytes_reads_material() {
        let mut material = vec![1, 2, 3, 4];
        let secret = MasterSecret::new(&mut material);

        let sum = secret
            .with_bytes(|bytes| Ok(bytes.iter().map(|b| u32::from(*b)).sum::<u32>()))
            .unwrap();
        assert_eq!(sum, 10);
    }

    #[test]
    fn test_close_is_irreversible_and_idempotent() {
        let mut material = vec![9_u8; 8];
        let secret = MasterSecret::new(&mut material);

        secret.close();
        assert!(secret.is_closed());
        assert_eq!(secret.len(), 0);
        assert!(matches!(
            secret.with_bytes(|_| Ok(())),
            Err(Error::SecretClosed)
        ));

        // second close is a no-op
        secret.close();
        assert!(secret.is_closed());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut material = vec![5_u8; 12];
        let secret = MasterSecret::new(&mut material);

        let copy = secret.clone();
        assert_eq!(copy, secret);

        copy.close();
        assert!(copy.is_closed());
        assert!(!secret.is_closed());
        assert_eq!(secret.len(), 12);
    }

    #[test]
    fn test_equality_is_content_based() {
        let mut a = vec![1_u8, 2, 3];
        let mut b = vec![1_u8, 2, 3];
        let mut c = vec![4_u8, 5, 6];

        let first = MasterSecret::new(&mut a);
        let second = MasterSecret::new(&mut b);
        let third = MasterSecret::new(&mut c);

        assert_eq!(first, second);
        assert_ne!(second, third);
    }

    #[test]
    fn test_generate() {
        let secret = MasterSecret::generate(32).unwrap();
        assert_eq!(secret.len(), 32);

        let other = MasterSecret::generate(32).unwrap();
        assert_ne!(secret, other);

        assert!(matches!(
            MasterSecret::generate(0),
            Err(Error::RandomGenerationFailed(_))
        ));
    }
}
