//! # mesh-node
//!
//! The Node Facade: composes the Signature Service, Connection Registry,
//! Routing Engine, Reliable Delivery Layer, Discovery Service, and Liveness
//! Supervisor into a single P2P mesh node.
//!
//! ```rust,ignore
//! use mesh_node::{Node, NodeConfig};
//!
//! let node = Node::new(NodeConfig::default().with_bind_addr("0.0.0.0", 9001));
//! node.set_on_message_delivered(|from, bytes| println!("{from}: {} bytes", bytes.len()));
//! node.start().await?;
//! node.connect("127.0.0.1", 9002).await?;
//! node.send(peer_id, b"hello".to_vec()).await;
//! ```

mod config;
mod error;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mesh_core::envelope::{EnvelopeBody, GroupId};
use mesh_core::event::{EventLog, NetworkEvent};
use mesh_core::identity::NodeId;
use mesh_crypto::SignatureService;
use mesh_delivery::ReliableDelivery;
use mesh_liveness::{LivenessSupervisor, NetworkStats};
use mesh_routing::RoutingEngine;
use mesh_transport::{ConnectionRegistry, DiscoveryEvent, DiscoveryService};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Callback invoked once a payload group has been fully reassembled.
pub type DeliveryCallback = Box<dyn Fn(NodeId, Vec<u8>) + Send + Sync>;

/// High-level P2P mesh node: owns every subsystem and exposes the small
/// surface an embedding application needs.
pub struct Node {
    config: NodeConfig,
    local_id: NodeId,
    signature: Arc<SignatureService>,
    connections: Arc<ConnectionRegistry>,
    routing: Arc<RoutingEngine>,
    delivery: Arc<ReliableDelivery>,
    discovery: Mutex<Option<Arc<DiscoveryService>>>,
    liveness: Arc<LivenessSupervisor>,
    events: Arc<Mutex<EventLog>>,
    on_delivered: Mutex<Option<DeliveryCallback>>,
    started: AtomicBool,
    local_addr: Mutex<Option<std::net::SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<(NodeId, mesh_core::envelope::MessageEnvelope)>>>,
    delivered_rx: Mutex<Option<mpsc::Receiver<(NodeId, Vec<u8>)>>>,
}

impl Node {
    /// Build a node with a freshly generated identity. Does not start
    /// networking — call [`Self::start`] for that.
    pub fn new(config: NodeConfig) -> Arc<Self> {
        Self::with_identity(config, SignatureService::generate())
    }

    /// Build a node with a caller-supplied identity (e.g. restored from a
    /// previously persisted keypair).
    pub fn with_identity(config: NodeConfig, signature: SignatureService) -> Arc<Self> {
        let signature = Arc::new(signature);
        let local_id = signature.node_id();

        let events = Arc::new(Mutex::new(EventLog::new(config.event_log_capacity)));

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_channel_capacity);
        let connections = ConnectionRegistry::new(local_id.clone(), signature.clone(), inbound_tx, events.clone());

        let routing = Arc::new(RoutingEngine::new(local_id.clone(), connections.clone(), events.clone()));

        let (delivered_tx, delivered_rx) = mpsc::channel(config.inbound_channel_capacity);
        let delivery = Arc::new(ReliableDelivery::new(local_id.clone(), routing.clone(), delivered_tx));

        let liveness = LivenessSupervisor::new(local_id.clone(), connections.clone(), events.clone(), config.liveness.clone());

        info!(node = %local_id, "node created");

        Arc::new(Self {
            config,
            local_id,
            signature,
            connections,
            routing,
            delivery,
            discovery: Mutex::new(None),
            liveness,
            events,
            on_delivered: Mutex::new(None),
            started: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            delivered_rx: Mutex::new(Some(delivered_rx)),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.local_id.clone()
    }

    /// Bound TCP service address, available once [`Self::start`] has
    /// completed. Useful when `bind_port` was `0` and the kernel picked.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Register the upcall fired after a payload group is fully reassembled.
    pub fn set_on_message_delivered(&self, callback: impl Fn(NodeId, Vec<u8>) + Send + Sync + 'static) {
        *self.on_delivered.lock() = Some(Box::new(callback));
    }

    /// Start accepting connections and running background sweeps.
    ///
    /// Idempotent: a second call while already started is a no-op, matching
    /// the external interface contract rather than treating re-start as an
    /// error.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("start() called while already started, ignoring");
            return Ok(());
        }

        let bind_addr = format!("{}:{}", self.config.bind_host, self.config.bind_port);
        let local_addr = self.connections.listen(bind_addr).await?;
        info!(addr = %local_addr, "tcp service listening");
        *self.local_addr.lock() = Some(local_addr);

        // Built here, not at construction, so the advertised service port
        // reflects the kernel-assigned port when `bind_port` is 0.
        let discovery = DiscoveryService::new(
            self.local_id.clone(),
            self.signature.clone(),
            local_addr.port(),
            self.config.discovery.clone(),
        );
        discovery.start().await?;

        let mut tasks = Vec::new();
        tasks.extend(self.liveness.spawn_scheduled_tasks());
        tasks.push(self.spawn_delivery_sweep());
        tasks.push(self.spawn_routing_sweep());
        tasks.push(self.spawn_connected_bridge());
        tasks.push(self.spawn_discovery_bridge(&discovery));
        *self.discovery.lock() = Some(discovery);

        if let Some(rx) = self.inbound_rx.lock().take() {
            tasks.push(self.spawn_inbound_pump(rx));
        }
        if let Some(rx) = self.delivered_rx.lock().take() {
            tasks.push(self.spawn_delivered_pump(rx));
        }

        *self.tasks.lock() = tasks;
        Ok(())
    }

    /// Stop the node: closes the listener and sessions, aborts background
    /// tasks, and tears down discovery. Idempotent.
    #[instrument(skip(self))]
    pub async fn stop(self: &Arc<Self>) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let discovery = self.discovery.lock().take();
        if let Some(discovery) = discovery {
            discovery.stop().await;
        }
        self.connections.stop().await;
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }

        info!("node stopped");
        Ok(())
    }

    /// Dial a peer directly, bypassing discovery.
    #[instrument(skip(self))]
    pub async fn connect(&self, host: &str, port: u16) -> NodeResult<NodeId> {
        let peer_id = self.connections.connect((host, port)).await?;
        self.liveness.register_peer(peer_id.clone(), format!("{host}:{port}"));
        Ok(peer_id)
    }

    /// Fragment and reliably send `bytes` to `target`. Returns the group id
    /// for correlating with delivery/ack state.
    pub async fn send(&self, target: NodeId, bytes: Vec<u8>) -> GroupId {
        self.delivery.send(target, bytes).await
    }

    pub fn all_peers(&self) -> Vec<NodeId> {
        self.connections.all_peers()
    }

    pub fn is_connected(&self, peer: &NodeId) -> bool {
        self.connections.is_connected(peer)
    }

    pub fn recent_events(&self) -> Vec<NetworkEvent> {
        self.events.lock().snapshot()
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.liveness.current_stats()
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signature.public_key()
    }

    /// Number of outgoing payload groups still awaiting acknowledgement.
    pub fn pending_outgoing(&self) -> usize {
        self.delivery.pending_outgoing()
    }

    /// Number of inbound payload groups with a reassembly buffer in progress.
    pub fn pending_incoming(&self) -> usize {
        self.delivery.pending_incoming()
    }

    /// Demultiplexes inbound envelopes between the delivery layer and the
    /// routing engine, standing in for the dispatch spec.md section 2
    /// assigns to the Connection Registry → Routing Engine → Reliable
    /// Delivery control flow. Locally targeted `Routing` envelopes are
    /// unwrapped here rather than relying on the routing engine's own
    /// local-delivery path, since that path only validates the route and
    /// has no reference back to the delivery layer.
    fn spawn_inbound_pump(
        self: &Arc<Self>,
        mut inbound_rx: mpsc::Receiver<(NodeId, mesh_core::envelope::MessageEnvelope)>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some((from, envelope)) = inbound_rx.recv().await {
                match envelope.body {
                    EnvelopeBody::Data(body) => {
                        if let Err(e) = this.delivery.on_data(from, body).await {
                            warn!(error = %e, "inbound data handling failed");
                        }
                    }
                    EnvelopeBody::Routing(renv) => {
                        if renv.target_id == this.local_id {
                            if let EnvelopeBody::Data(body) = renv.payload.body.clone() {
                                let sender = renv.payload.sender_id.clone();
                                if let Err(e) = this.delivery.on_data(sender, body).await {
                                    warn!(error = %e, "locally delivered data handling failed");
                                }
                            }
                        } else if let Err(e) = this.routing.handle_routing(renv, Some(from)).await {
                            debug!(error = %e, "routing envelope dropped");
                        }
                    }
                    _ => {}
                }
            }
        })
    }

    /// Bridges reassembled payloads out to the application callback.
    fn spawn_delivered_pump(self: &Arc<Self>, mut delivered_rx: mpsc::Receiver<(NodeId, Vec<u8>)>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some((from, bytes)) = delivered_rx.recv().await {
                if let Some(callback) = this.on_delivered.lock().as_ref() {
                    callback(from, bytes);
                }
            }
        })
    }

    /// Bridges newly authenticated peers into the event log and the
    /// Liveness Supervisor's health tracking.
    fn spawn_connected_bridge(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut connected_rx = self.connections.subscribe_connected();
        tokio::spawn(async move {
            while let Ok(peer_id) = connected_rx.recv().await {
                this.liveness.on_peer_connected(&peer_id);
            }
        })
    }

    /// Bridges discovered peers into the Liveness Supervisor's reconnect
    /// address book and dials any that have no authenticated session yet,
    /// matching section 2's control flow ("Discovery ... feeds peer
    /// candidates into Connection Registry").
    fn spawn_discovery_bridge(self: &Arc<Self>, discovery: &Arc<DiscoveryService>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut discovery_rx = discovery.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = discovery_rx.recv().await {
                match event {
                    DiscoveryEvent::PeerDiscovered(record) | DiscoveryEvent::PeerUpdated(record) => {
                        let address = format!("{}:{}", record.host, record.port);
                        this.liveness.register_peer(record.node_id.clone(), address);
                        if !this.connections.is_connected(&record.node_id) {
                            if let Err(e) = this.connections.connect((record.host.as_str(), record.port)).await {
                                debug!(peer = %record.node_id, error = %e, "discovery-triggered connect failed");
                            }
                        }
                    }
                    DiscoveryEvent::PeerLost(_) => {}
                }
            }
        })
    }

    fn spawn_delivery_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = std::time::Duration::from_millis(self.config.delivery.sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.delivery.sweep_timeouts().await;
            }
        })
    }

    /// Periodically evicts entries older than five minutes from the routing
    /// engine's duplicate/loop suppression cache, per section 3's expiry
    /// invariant for recently-seen message-ids.
    fn spawn_routing_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = std::time::Duration::from_millis(self.config.routing_sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.routing.expire_recent_messages();
            }
        })
    }
}

/// Install a `tracing-subscriber` `fmt` subscriber reading `RUST_LOG`, for
/// binaries that embed a node and want logging without wiring it up
/// themselves. Library code never calls this; only examples and tests do.
#[cfg(feature = "tracing-setup")]
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NodeConfig {
        NodeConfig::default().with_bind_addr("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let node = Node::new(config());
        node.start().await.unwrap();
        assert!(node.is_started());
        node.start().await.unwrap();
        assert!(node.is_started());
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_is_a_harmless_no_op() {
        let node = Node::new(config());
        node.stop().await.unwrap();
        assert!(!node.is_started());
    }

    #[tokio::test]
    async fn fresh_node_has_no_peers_and_an_empty_event_log() {
        let node = Node::new(config());
        assert!(node.all_peers().is_empty());
        assert!(node.recent_events().is_empty());
    }
}
