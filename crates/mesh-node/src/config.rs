//! Configuration for the node coordinator.

use mesh_delivery::DeliveryConfig;
use mesh_liveness::LivenessConfig;
use mesh_transport::DiscoveryConfig;

/// Configuration for a [`crate::Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host the TCP service listener binds to.
    pub bind_host: String,
    /// TCP service port; `0` defers to kernel selection.
    pub bind_port: u16,
    /// UDP discovery tuning.
    pub discovery: DiscoveryConfig,
    /// Liveness sweep tuning.
    pub liveness: LivenessConfig,
    /// Reliable-delivery sweep tuning.
    pub delivery: DeliveryConfig,
    /// Interval, in milliseconds, between sweeps that expire old entries
    /// from the routing engine's duplicate/loop suppression cache.
    pub routing_sweep_interval_ms: u64,
    /// Capacity of the ring-buffered event log.
    pub event_log_capacity: usize,
    /// Capacity of the inbound envelope channel between the connection
    /// registry and the node's demultiplexing task.
    pub inbound_channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 0,
            discovery: DiscoveryConfig::default(),
            liveness: LivenessConfig::default(),
            delivery: DeliveryConfig::default(),
            routing_sweep_interval_ms: 60_000,
            event_log_capacity: 1000,
            inbound_channel_capacity: 1024,
        }
    }
}

impl NodeConfig {
    pub fn with_bind_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.bind_host = host.into();
        self.bind_port = port;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_routing_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.routing_sweep_interval_ms = interval_ms;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }
}
