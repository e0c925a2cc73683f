//! UDP broadcast discovery: periodically solicit peers with a broadcast
//! `DiscoveryRequest`, answer requests with a unicast `DiscoveryResponse`,
//! and exchange `PeerListRequest`/`PeerListResponse` snapshots of known
//! peers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mesh_core::envelope::{DiscoveryBody, EnvelopeBody, MessageEnvelope};
use mesh_core::identity::{NodeId, PeerRecord};
use mesh_crypto::SignatureService;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{frame_message, parse_framed_message};

/// Default UDP port nodes broadcast discovery traffic on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 54321;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub broadcast_interval_ms: u64,
    pub stale_timeout_ms: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { port: DEFAULT_DISCOVERY_PORT, broadcast_interval_ms: 30_000, stale_timeout_ms: 300_000 }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket: {0}")]
    BindFailed(String),
    #[error("failed to send discovery datagram: {0}")]
    SendFailed(String),
    #[error("discovery service not running")]
    NotRunning,
}

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    PeerDiscovered(PeerRecord),
    PeerUpdated(PeerRecord),
    PeerLost(NodeId),
}

/// Broadcasts this node's presence over UDP and tracks peers heard from.
pub struct DiscoveryService {
    local_id: NodeId,
    signature: Arc<SignatureService>,
    service_port: u16,
    config: DiscoveryConfig,
    known_peers: DashMap<NodeId, PeerRecord>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryService {
    pub fn new(
        local_id: NodeId,
        signature: Arc<SignatureService>,
        service_port: u16,
        config: DiscoveryConfig,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            local_id,
            signature,
            service_port,
            config,
            known_peers: DashMap::new(),
            event_tx,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let socket = UdpSocket::bind(("0.0.0.0", self.config.port))
            .await
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        socket.set_broadcast(true).map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        let socket = Arc::new(socket);

        info!(port = self.config.port, "discovery service started");

        let listener = {
            let this = Arc::clone(self);
            let socket = Arc::clone(&socket);
            tokio::spawn(async move { this.listen_loop(socket).await })
        };

        let announcer = {
            let this = Arc::clone(self);
            let socket = Arc::clone(&socket);
            tokio::spawn(async move { this.announce_loop(socket).await })
        };

        let sweeper = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.sweep_loop().await })
        };

        *self.tasks.lock().await = vec![listener, announcer, sweeper];
        Ok(())
    }

    async fn sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.stale_timeout_ms as u64));
        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.sweep_stale();
        }
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    async fn announce_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.config.broadcast_interval_ms));
        let broadcast_addr: SocketAddr = ([255, 255, 255, 255], self.config.port).into();

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if let Err(e) = self.announce(&socket, broadcast_addr).await {
                warn!(error = %e, "discovery announce failed");
            }
        }
    }

    /// Periodic broadcast soliciting a unicast `DiscoveryResponse` from
    /// every node listening on the discovery port.
    async fn announce(&self, socket: &UdpSocket, addr: SocketAddr) -> Result<(), DiscoveryError> {
        self.send_discovery(socket, addr, DiscoveryBody::DiscoveryRequest).await
    }

    async fn send_discovery(&self, socket: &UdpSocket, to: SocketAddr, body: DiscoveryBody) -> Result<(), DiscoveryError> {
        let envelope = MessageEnvelope::new(Uuid::new_v4(), self.local_id.clone(), EnvelopeBody::Discovery(body));
        let framed = frame_message(&envelope).map_err(|e| DiscoveryError::SendFailed(e.to_string()))?;
        socket.send_to(&framed, to).await.map_err(|e| DiscoveryError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn listen_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; 8192];
        while self.running.load(Ordering::SeqCst) {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "discovery recv failed");
                    continue;
                }
            };
            self.handle_datagram(&buf[..len], from, &socket).await;
        }
    }

    async fn handle_datagram(&self, data: &[u8], from: SocketAddr, socket: &UdpSocket) {
        let envelope = match parse_framed_message(data) {
            Ok(env) => env,
            Err(_) => return,
        };

        if envelope.sender_id == self.local_id {
            return;
        }

        let EnvelopeBody::Discovery(body) = envelope.body else { return };
        match body {
            DiscoveryBody::DiscoveryRequest => {
                let response = DiscoveryBody::DiscoveryResponse { host: "0.0.0.0".to_string(), service_port: self.service_port };
                if let Err(e) = self.send_discovery(socket, from, response).await {
                    warn!(error = %e, "discovery response send failed");
                }
            }
            DiscoveryBody::DiscoveryResponse { service_port, .. } => {
                self.record_peer(envelope.sender_id, from.ip().to_string(), service_port);
            }
            DiscoveryBody::PeerListRequest => {
                let peers = self.known_peers();
                let response = DiscoveryBody::PeerListResponse { peers };
                if let Err(e) = self.send_discovery(socket, from, response).await {
                    warn!(error = %e, "peer list response send failed");
                }
            }
            DiscoveryBody::PeerListResponse { peers } => {
                for record in peers {
                    if record.node_id == self.local_id {
                        continue;
                    }
                    self.record_peer(record.node_id, record.host, record.port);
                }
            }
        }
    }

    /// Insert or refresh a known-peer record and emit the corresponding
    /// discovery event.
    fn record_peer(&self, peer_id: NodeId, host: String, port: u16) {
        let record = PeerRecord::new(peer_id.clone(), host, port);
        let is_new = !self.known_peers.contains_key(&peer_id);
        self.known_peers.insert(peer_id.clone(), record.clone());

        let event = if is_new {
            debug!(peer = %peer_id, "discovered peer");
            DiscoveryEvent::PeerDiscovered(record)
        } else {
            DiscoveryEvent::PeerUpdated(record)
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    pub fn known_peers(&self) -> Vec<PeerRecord> {
        self.known_peers.iter().map(|e| e.value().clone()).collect()
    }

    /// Drop peers whose last announcement is older than the stale timeout.
    pub fn sweep_stale(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        let stale: Vec<NodeId> = self
            .known_peers
            .iter()
            .filter(|e| now - e.value().last_seen_millis > self.config.stale_timeout_ms)
            .map(|e| e.key().clone())
            .collect();

        for peer_id in stale {
            self.known_peers.remove(&peer_id);
            let _ = self.event_tx.send(DiscoveryEvent::PeerLost(peer_id));
        }
    }
}
