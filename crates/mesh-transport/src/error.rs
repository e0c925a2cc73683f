//! Transport-layer errors: re-exports the shared taxonomy plus a
//! framing-specific error for malformed wire data.

pub use mesh_core::error::{AuthenticationError, ProtocolError, TransportError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}
