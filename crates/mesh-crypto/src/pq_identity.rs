//! Post-quantum identity using ML-DSA (Dilithium) signatures.
//!
//! Backs the signature service's keypair: NIST FIPS 204 ML-DSA, Dilithium3
//! parameter set (≈128-bit post-quantum security).
//!
//! ## Key sizes (Dilithium3)
//!
//! - Signing key: 4,000 bytes
//! - Verifying key: 1,952 bytes
//! - Signature: 3,293 bytes
//!
//! Secret keys are zeroized on drop.

use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey as _, SecretKey as _};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const PQ_SIGNING_KEY_SIZE: usize = dilithium3::secret_key_bytes();
pub const PQ_VERIFYING_KEY_SIZE: usize = dilithium3::public_key_bytes();
pub const PQ_SIGNATURE_SIZE: usize = dilithium3::signature_bytes();

/// Secure byte container that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A Dilithium3 keypair: signing key (private) and verifying key (public).
#[derive(Clone)]
pub struct PQIdentity {
    signing_key: dilithium3::SecretKey,
    verifying_key: dilithium3::PublicKey,
}

impl PQIdentity {
    pub fn generate() -> Self {
        let (verifying_key, signing_key) = dilithium3::keypair();
        Self { signing_key, verifying_key }
    }

    /// Reconstruct from previously-exported keypair bytes.
    pub fn from_keypair_bytes(sk_bytes: &[u8], pk_bytes: &[u8]) -> Result<Self, CryptoError> {
        if sk_bytes.len() != PQ_SIGNING_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid signing key size: expected {}, got {}",
                PQ_SIGNING_KEY_SIZE,
                sk_bytes.len()
            )));
        }
        if pk_bytes.len() != PQ_VERIFYING_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid verifying key size: expected {}, got {}",
                PQ_VERIFYING_KEY_SIZE,
                pk_bytes.len()
            )));
        }

        let signing_key = dilithium3::SecretKey::from_bytes(sk_bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid signing key: {e:?}")))?;
        let verifying_key = dilithium3::PublicKey::from_bytes(pk_bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid verifying key: {e:?}")))?;

        Ok(Self { signing_key, verifying_key })
    }

    /// (signing key, verifying key) bytes for persistence. The signing key
    /// is wrapped in [`SecureBytes`] so it zeroizes when dropped.
    pub fn to_keypair_bytes(&self) -> (SecureBytes, Vec<u8>) {
        (
            SecureBytes::new(self.signing_key.as_bytes().to_vec()),
            self.verifying_key.as_bytes().to_vec(),
        )
    }

    pub fn verifying_key(&self) -> PQPublicIdentity {
        PQPublicIdentity { verifying_key: self.verifying_key.clone() }
    }

    pub fn verifying_key_bytes(&self) -> Vec<u8> {
        self.verifying_key.as_bytes().to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> PQSignature {
        let sig = dilithium3::detached_sign(message, &self.signing_key);
        PQSignature { bytes: sig.as_bytes().to_vec() }
    }

    pub fn verify(&self, message: &[u8], signature: &PQSignature) -> bool {
        self.verifying_key().verify(message, signature)
    }
}

impl std::fmt::Debug for PQIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PQIdentity")
            .field("verifying_key", &hex::encode(&self.verifying_key_bytes()[..8]))
            .finish_non_exhaustive()
    }
}

/// The public half of a [`PQIdentity`]. Freely shareable.
#[derive(Clone)]
pub struct PQPublicIdentity {
    verifying_key: dilithium3::PublicKey,
}

impl PQPublicIdentity {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PQ_VERIFYING_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid verifying key size: expected {}, got {}",
                PQ_VERIFYING_KEY_SIZE,
                bytes.len()
            )));
        }
        let verifying_key = dilithium3::PublicKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid verifying key: {e:?}")))?;
        Ok(Self { verifying_key })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.verifying_key.as_bytes().to_vec()
    }

    pub fn verify(&self, message: &[u8], signature: &PQSignature) -> bool {
        if signature.bytes.len() != PQ_SIGNATURE_SIZE {
            return false;
        }
        match dilithium3::DetachedSignature::from_bytes(&signature.bytes) {
            Ok(sig) => dilithium3::verify_detached_signature(&sig, message, &self.verifying_key).is_ok(),
            Err(_) => false,
        }
    }

    pub fn short_id(&self) -> String {
        hex::encode(&self.to_bytes()[..8])
    }
}

impl std::fmt::Debug for PQPublicIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PQPublicIdentity").field("id", &self.short_id()).finish()
    }
}

impl PartialEq for PQPublicIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PQPublicIdentity {}

impl std::hash::Hash for PQPublicIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PQSignature {
    bytes: Vec<u8>,
}

impl PQSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != PQ_SIGNATURE_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid signature size: expected {}, got {}",
                PQ_SIGNATURE_SIZE,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_identity_has_short_id() {
        let identity = PQIdentity::generate();
        assert!(!identity.verifying_key().short_id().is_empty());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let identity = PQIdentity::generate();
        let message = b"hello quantum-resistant world";
        let signature = identity.sign(message);
        assert!(identity.verify(message, &signature));
        assert!(identity.verifying_key().verify(message, &signature));
    }

    #[test]
    fn wrong_message_fails() {
        let identity = PQIdentity::generate();
        let signature = identity.sign(b"original");
        assert!(!identity.verify(b"tampered", &signature));
    }

    #[test]
    fn wrong_key_fails() {
        let a = PQIdentity::generate();
        let b = PQIdentity::generate();
        let signature = a.sign(b"test");
        assert!(!b.verify(b"test", &signature));
    }

    #[test]
    fn keypair_roundtrip_preserves_signing_ability() {
        let identity = PQIdentity::generate();
        let (sk, pk) = identity.to_keypair_bytes();
        let restored = PQIdentity::from_keypair_bytes(sk.as_slice(), &pk).unwrap();

        assert_eq!(identity.verifying_key_bytes(), restored.verifying_key_bytes());

        let signature = identity.sign(b"msg");
        assert!(restored.verify(b"msg", &signature));
    }

    #[test]
    fn public_identity_equality_and_hash() {
        use std::collections::HashSet;

        let a = PQIdentity::generate();
        let b = PQIdentity::generate();

        assert_eq!(a.verifying_key(), a.verifying_key());
        assert_ne!(a.verifying_key(), b.verifying_key());

        let mut set = HashSet::new();
        set.insert(a.verifying_key());
        set.insert(b.verifying_key());
        set.insert(a.verifying_key());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn invalid_key_sizes_rejected() {
        assert!(PQPublicIdentity::from_bytes(&[0u8; 100]).is_err());
    }

    #[test]
    fn signature_size_validation() {
        assert!(PQSignature::from_bytes(vec![0u8; PQ_SIGNATURE_SIZE - 1]).is_err());
        assert!(PQSignature::from_bytes(vec![0u8; PQ_SIGNATURE_SIZE + 1]).is_err());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let identity = PQIdentity::generate();
        let message = b"test message";
        let signature = identity.sign(message);

        let mut bad_bytes = signature.to_bytes().to_vec();
        bad_bytes[0] ^= 0xFF;

        if let Ok(bad_sig) = PQSignature::from_bytes(bad_bytes) {
            assert!(!identity.verify(message, &bad_sig));
        }
    }

    #[test]
    fn sign_empty_and_large_messages() {
        let identity = PQIdentity::generate();
        assert!(identity.verify(b"", &identity.sign(b"")));

        let large = vec![0xABu8; 1024 * 1024];
        assert!(identity.verify(&large, &identity.sign(&large)));
    }
}
