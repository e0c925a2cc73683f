//! # mesh-crypto
//!
//! The node's signature service: post-quantum (NIST FIPS 204 ML-DSA /
//! Dilithium3) digital signatures used to authenticate handshakes. No
//! payload encryption — the design authenticates but does not encrypt.

pub mod error;
pub mod pq_identity;
pub mod signature;

pub use error::{CryptoError, CryptoResult};
pub use pq_identity::{
    PQIdentity, PQPublicIdentity, PQSignature, SecureBytes, PQ_SIGNATURE_SIZE, PQ_SIGNING_KEY_SIZE,
    PQ_VERIFYING_KEY_SIZE,
};
pub use signature::{Signature, SignatureService};
