//! Ed25519 keys for validator partial signatures.

use crate::{Address, Hash, ADDRESS_LENGTH};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use sbor::prelude::*;
use std::fmt;

/// Length of an ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 public key bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Derive the validator address for this key.
    pub fn address(&self) -> Address {
        let digest = Hash::from_bytes(&self.0);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Address(bytes)
    }

    /// Verify `signature` over `message`.
    ///
    /// Malformed keys or signatures verify as `false`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", &hex::encode(self.0)[..16])
    }
}

/// A validator signing key.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Build a key pair from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Generate a key pair from the given RNG.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sign_and_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let key = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);

        let signature = key.sign(b"vote");
        assert_eq!(signature.len(), SIGNATURE_LENGTH);
        assert!(key.public_key().verify(b"vote", &signature));
        assert!(!key.public_key().verify(b"other", &signature));
        assert!(!other.public_key().verify(b"vote", &signature));
        assert!(!key.public_key().verify(b"vote", &signature[..10]));
    }

    #[test]
    fn test_address_is_stable_per_key() {
        let key = KeyPair::from_seed(&[3u8; 32]);
        assert_eq!(key.address(), KeyPair::from_seed(&[3u8; 32]).address());
        assert_ne!(key.address(), KeyPair::from_seed(&[4u8; 32]).address());
    }
}
