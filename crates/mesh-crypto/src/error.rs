//! Errors for the signature service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
