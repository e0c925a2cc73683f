//! The node-owned signature service: the external interface named in the
//! specification — `keypair()`, `sign(bytes)`, `verify(bytes, signature,
//! pubkey)`, `public_key()` — over the Dilithium3 primitive in
//! [`crate::pq_identity`].
//!
//! There is no process-wide registration here: every node constructs and
//! owns its own `SignatureService`, passed by reference to the subsystems
//! that need it (Handshake Engine, Discovery Service).

use mesh_core::identity::NodeId;

use crate::error::CryptoError;
use crate::pq_identity::{PQIdentity, PQPublicIdentity, PQSignature, SecureBytes};

/// Opaque signature bytes, bit-exact with the underlying primitive.
pub type Signature = Vec<u8>;

/// Owns a node's Dilithium3 keypair and exposes sign/verify.
pub struct SignatureService {
    identity: PQIdentity,
}

impl SignatureService {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Self { identity: PQIdentity::generate() }
    }

    /// Restore from previously-persisted keypair bytes.
    pub fn from_keypair_bytes(signing_key: &[u8], verifying_key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self { identity: PQIdentity::from_keypair_bytes(signing_key, verifying_key)? })
    }

    /// Export the keypair for persistence. The signing key half zeroizes on drop.
    pub fn to_keypair_bytes(&self) -> (SecureBytes, Vec<u8>) {
        self.identity.to_keypair_bytes()
    }

    /// Sign `bytes` with the local private key.
    pub fn sign(&self, bytes: &[u8]) -> Signature {
        self.identity.sign(bytes).to_bytes().to_vec()
    }

    /// Verify `signature` over `bytes` against an arbitrary `public_key`.
    pub fn verify(bytes: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(public) = PQPublicIdentity::from_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = PQSignature::from_bytes(signature.to_vec()) else {
            return false;
        };
        public.verify(bytes, &sig)
    }

    /// This node's raw public key bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.identity.verifying_key_bytes()
    }

    /// This node's [`NodeId`], derived from its public key.
    pub fn node_id(&self) -> NodeId {
        NodeId::from_bytes(self.public_key()).expect("public key is never empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_with_static_method() {
        let service = SignatureService::generate();
        let message = b"handshake payload";
        let signature = service.sign(message);

        assert!(SignatureService::verify(message, &signature, &service.public_key()));
    }

    #[test]
    fn verify_rejects_wrong_public_key() {
        let a = SignatureService::generate();
        let b = SignatureService::generate();
        let signature = a.sign(b"msg");

        assert!(!SignatureService::verify(b"msg", &signature, &b.public_key()));
    }

    #[test]
    fn verify_rejects_garbage_public_key() {
        let service = SignatureService::generate();
        let signature = service.sign(b"msg");
        assert!(!SignatureService::verify(b"msg", &signature, &[0u8; 4]));
    }

    #[test]
    fn node_id_matches_public_key_bytes() {
        let service = SignatureService::generate();
        assert_eq!(service.node_id().as_bytes(), service.public_key().as_slice());
    }

    #[test]
    fn keypair_roundtrip_preserves_node_id() {
        let service = SignatureService::generate();
        let (sk, pk) = service.to_keypair_bytes();
        let restored = SignatureService::from_keypair_bytes(sk.as_slice(), &pk).unwrap();
        assert_eq!(service.node_id(), restored.node_id());
    }
}
