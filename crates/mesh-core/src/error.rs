//! Error taxonomy shared across the mesh crates.

use thiserror::Error;

/// Top-level error aggregating every subsystem's error enum.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Routing(#[from] NoRouteError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors constructing or parsing a [`crate::identity::NodeId`].
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

/// Socket- and connection-level failures below the protocol layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handshake / signature verification failures. Always fatal to the session
/// attempt in progress.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("challenge mismatch")]
    ChallengeMismatch,

    #[error("handshake timed out")]
    Timeout,

    #[error("unexpected message in handshake state {state}")]
    UnexpectedMessage { state: &'static str },

    #[error("peer identity mismatch")]
    IdentityMismatch,
}

/// Malformed or out-of-sequence wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("message exceeds maximum size: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Routing-level delivery failure.
#[derive(Debug, Error)]
pub enum NoRouteError {
    #[error("no route to destination {0}")]
    NoRoute(String),

    #[error("hop count exceeded for message {0}")]
    HopCountExceeded(String),

    #[error("message already seen, dropped")]
    Duplicate,
}

/// Reliable-delivery fragmentation/reassembly failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("checksum mismatch for chunk group {group}, index {index}")]
    ChecksumMismatch { group: String, index: u32 },

    #[error("delivery timed out for group {0}")]
    Timeout(String),

    #[error("retransmit limit exceeded for group {0}")]
    RetransmitLimitExceeded(String),

    #[error("reassembly buffer exceeded maximum size")]
    BufferOverflow,
}

pub type MeshResult<T> = Result<T, MeshError>;
