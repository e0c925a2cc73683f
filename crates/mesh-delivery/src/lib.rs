//! # mesh-delivery
//!
//! The Reliable Delivery Layer: splits outbound payloads into checksummed,
//! acknowledged chunks and reassembles them on the receiving side, with
//! bounded retransmission on loss.

pub mod config;
pub mod delivery;
pub mod error;
pub mod reassembly;
pub mod tracker;

pub use config::DeliveryConfig;
pub use delivery::{ReliableDelivery, CHUNK_SIZE};
pub use error::{DeliveryError, DeliveryResult};
pub use reassembly::ReassemblyBuffer;
pub use tracker::{OutgoingTracker, MAX_RETRIES};
