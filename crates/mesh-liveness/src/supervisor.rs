//! Liveness Supervisor: periodic health sweeps, bounded-backoff reconnection,
//! and the metrics snapshot surfaced to the Node Facade.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mesh_core::event::{EventLog, NetworkEvent};
use mesh_core::identity::NodeId;
use mesh_transport::ConnectionRegistry;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::health::PeerHealth;
use crate::stats::NetworkStats;

/// Scheduling knobs for the supervisor's background sweeps.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    pub health_sweep_interval_ms: u64,
    pub metrics_interval_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { health_sweep_interval_ms: 5_000, metrics_interval_ms: 1_000 }
    }
}

/// Tracks peer liveness and drives reconnection, mirroring the structure of
/// [`ConnectionRegistry`] but for health state rather than live sessions.
pub struct LivenessSupervisor {
    local_id: NodeId,
    connections: Arc<ConnectionRegistry>,
    events: Arc<Mutex<EventLog>>,
    config: LivenessConfig,
    health: DashMap<NodeId, PeerHealth>,
    reconnect_addrs: DashMap<NodeId, String>,
    stats: Mutex<NetworkStats>,
}

impl LivenessSupervisor {
    pub fn new(
        local_id: NodeId,
        connections: Arc<ConnectionRegistry>,
        events: Arc<Mutex<EventLog>>,
        config: LivenessConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            connections,
            events,
            config,
            health: DashMap::new(),
            reconnect_addrs: DashMap::new(),
            stats: Mutex::new(NetworkStats::default()),
        })
    }

    /// Begin tracking a peer, recording the address to redial if it drops.
    pub fn register_peer(&self, peer_id: NodeId, address: String) {
        self.health.entry(peer_id.clone()).or_insert_with(PeerHealth::new);
        self.reconnect_addrs.insert(peer_id, address);
    }

    pub fn on_peer_connected(&self, peer_id: &NodeId) {
        let mut entry = self.health.entry(peer_id.clone()).or_insert_with(PeerHealth::new);
        entry.on_reconnected();
        self.events.lock().push(NetworkEvent::peer_connected(peer_id.clone()));
    }

    pub fn record_message(&self, peer_id: &NodeId, latency: Duration) {
        if let Some(mut entry) = self.health.get_mut(peer_id) {
            entry.record_message(latency);
        }
    }

    pub fn record_error(&self, peer_id: &NodeId) {
        if let Some(mut entry) = self.health.get_mut(peer_id) {
            entry.record_error();
        }
    }

    pub fn peer_health(&self, peer_id: &NodeId) -> Option<PeerHealth> {
        self.health.get(peer_id).map(|e| e.clone())
    }

    /// One round of health checking: mark peers unhealthy, and for any peer
    /// that's due, kick off a detached reconnection attempt. Never holds a
    /// lock across an `.await`.
    #[instrument(skip(self))]
    pub async fn health_sweep(self: &Arc<Self>) {
        let unhealthy: Vec<NodeId> = self
            .health
            .iter()
            .filter(|e| !e.value().is_healthy() && !e.value().recovery_failed)
            .map(|e| e.key().clone())
            .collect();

        for peer_id in unhealthy {
            if self.connections.is_connected(&peer_id) {
                continue;
            }

            self.events.lock().push(NetworkEvent::peer_unhealthy(peer_id.clone()));

            let ready = self.health.get(&peer_id).map(|e| e.ready_for_attempt()).unwrap_or(false);
            if !ready {
                continue;
            }

            let exhausted = self.health.get(&peer_id).map(|e| e.exhausted()).unwrap_or(true);
            if exhausted {
                if let Some(mut entry) = self.health.get_mut(&peer_id) {
                    if !entry.recovery_failed {
                        entry.recovery_failed = true;
                        warn!(peer = %peer_id, "reconnection attempts exhausted");
                        self.events.lock().push(NetworkEvent::recovery_failed(peer_id.clone()));
                    }
                }
                continue;
            }

            let Some(address) = self.reconnect_addrs.get(&peer_id).map(|e| e.clone()) else {
                continue;
            };
            let attempt = self.health.get_mut(&peer_id).map(|mut e| e.record_attempt()).unwrap_or(1);
            self.events.lock().push(NetworkEvent::recovery_attempted(peer_id.clone(), attempt));

            let this = Arc::clone(self);
            tokio::spawn(async move { this.attempt_reconnect(peer_id, address, attempt).await });
        }
    }

    async fn attempt_reconnect(self: Arc<Self>, peer_id: NodeId, address: String, attempt: u32) {
        info!(peer = %peer_id, attempt, "attempting reconnection");
        match self.connections.connect(address).await {
            Ok(resolved) => {
                self.on_peer_connected(&resolved);
                self.events.lock().push(NetworkEvent::recovery_succeeded(resolved));
            }
            Err(e) => {
                warn!(peer = %peer_id, attempt, error = %e, "reconnection attempt failed");
            }
        }
    }

    /// Recompute the metrics snapshot from current health state. Reads the
    /// whole map under a single pass so the result is internally consistent.
    pub fn refresh_stats(&self) {
        let mut latencies = Vec::new();
        let mut message_counts = Vec::new();
        let mut error_counts = Vec::new();
        let mut active = 0usize;

        for entry in self.health.iter() {
            let h = entry.value();
            if h.is_healthy() {
                active += 1;
            }
            if h.message_count() > 0 {
                latencies.push(h.observed_latency_ms());
            }
            message_counts.push(h.message_count());
            error_counts.push(h.error_count());
        }

        let snapshot = NetworkStats::compute(&latencies, &message_counts, &error_counts, active);
        *self.stats.lock() = snapshot;
    }

    pub fn current_stats(&self) -> NetworkStats {
        self.stats.lock().clone()
    }

    /// Spawn the two background sweep loops. Returns their join handles so
    /// the caller can abort them on shutdown.
    pub fn spawn_scheduled_tasks(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let health_supervisor = Arc::clone(self);
        let health_interval = Duration::from_millis(self.config.health_sweep_interval_ms);
        let health_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(health_interval);
            loop {
                interval.tick().await;
                health_supervisor.health_sweep().await;
            }
        });

        let metrics_supervisor = Arc::clone(self);
        let metrics_interval = Duration::from_millis(self.config.metrics_interval_ms);
        let metrics_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(metrics_interval);
            loop {
                interval.tick().await;
                metrics_supervisor.refresh_stats();
            }
        });

        vec![health_handle, metrics_handle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::identity::NodeId;
    use mesh_crypto::SignatureService;
    use tokio::sync::mpsc;

    fn registry() -> Arc<ConnectionRegistry> {
        let sig = Arc::new(SignatureService::generate());
        let id = sig.node_id();
        let (tx, _rx) = mpsc::channel(16);
        ConnectionRegistry::new(id, sig, tx, Arc::new(Mutex::new(EventLog::new(64))))
    }

    fn supervisor() -> Arc<LivenessSupervisor> {
        let sig = Arc::new(SignatureService::generate());
        let id = sig.node_id();
        let events = Arc::new(Mutex::new(EventLog::new(64)));
        LivenessSupervisor::new(id, registry(), events, LivenessConfig::default())
    }

    #[tokio::test]
    async fn health_sweep_skips_peers_with_no_registered_address() {
        let supervisor = supervisor();
        let peer = NodeId::from_bytes(vec![9]).unwrap();
        supervisor.health.insert(peer.clone(), PeerHealth::new());
        // Force unhealthy by backdating is awkward without clock injection;
        // an already-healthy peer is simply skipped, which this asserts.
        supervisor.health_sweep().await;
        assert!(supervisor.peer_health(&peer).unwrap().is_healthy());
    }

    #[test]
    fn refresh_stats_reflects_registered_peers() {
        let supervisor = supervisor();
        let peer = NodeId::from_bytes(vec![11]).unwrap();
        supervisor.register_peer(peer.clone(), "127.0.0.1:1".into());
        supervisor.record_message(&peer, Duration::from_millis(5));
        supervisor.refresh_stats();
        let stats = supervisor.current_stats();
        assert_eq!(stats.active_peer_count, 1);
        assert_eq!(stats.total_message_count, 1);
    }
}
