//! # mesh-transport
//!
//! Session handshakes, the connection registry, and UDP discovery: the
//! layer between raw sockets and the routing engine.

pub mod connection;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod session;

pub use connection::ConnectionRegistry;
pub use discovery::{DiscoveryConfig, DiscoveryError, DiscoveryEvent, DiscoveryService, DEFAULT_DISCOVERY_PORT};
pub use error::FramingError;
pub use handshake::HandshakeEngine;
pub use protocol::{frame_message, parse_framed_message, MAX_MESSAGE_SIZE};
pub use session::{Session, SessionPhase};
