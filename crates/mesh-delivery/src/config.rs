//! Scheduling knobs for the delivery layer's background timeout sweep.
//!
//! Chunk size and retry budget are compiled-in constants ([`crate::CHUNK_SIZE`],
//! [`crate::MAX_RETRIES`]) rather than runtime knobs, since the wire format
//! assumes fixed chunking on both ends of a session; this config only covers
//! how often the Node Facade drives [`crate::ReliableDelivery::sweep_timeouts`].

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub sweep_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { sweep_interval_ms: 30_000 }
    }
}
