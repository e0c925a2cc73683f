//! Network events emitted by the liveness supervisor, routing engine, and
//! connection registry for observability and testing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

/// An observable occurrence in the mesh, timestamped at emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkEvent {
    /// A session with `peer` completed its handshake.
    PeerConnected { peer: NodeId, timestamp: DateTime<Utc> },

    /// A session with `peer` was torn down (graceful or otherwise).
    PeerDisconnected { peer: NodeId, timestamp: DateTime<Utc> },

    /// A peer missed enough liveness checks to be marked unhealthy.
    PeerUnhealthy { peer: NodeId, timestamp: DateTime<Utc> },

    /// A route to `destination` via `next_hop` was learned or confirmed.
    RouteDiscovered {
        destination: NodeId,
        next_hop: NodeId,
        timestamp: DateTime<Utc>,
    },

    /// A previously known route to `destination` was pruned as stale.
    RouteLost { destination: NodeId, timestamp: DateTime<Utc> },

    /// A reconnection attempt to `peer` started (`attempt` is 1-based).
    RecoveryAttempted {
        peer: NodeId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A reconnection attempt to `peer` succeeded.
    RecoverySucceeded { peer: NodeId, timestamp: DateTime<Utc> },

    /// Reconnection to `peer` exhausted its attempt budget.
    RecoveryFailed { peer: NodeId, timestamp: DateTime<Utc> },
}

impl NetworkEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::PeerConnected { timestamp, .. } => *timestamp,
            Self::PeerDisconnected { timestamp, .. } => *timestamp,
            Self::PeerUnhealthy { timestamp, .. } => *timestamp,
            Self::RouteDiscovered { timestamp, .. } => *timestamp,
            Self::RouteLost { timestamp, .. } => *timestamp,
            Self::RecoveryAttempted { timestamp, .. } => *timestamp,
            Self::RecoverySucceeded { timestamp, .. } => *timestamp,
            Self::RecoveryFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn peer_connected(peer: NodeId) -> Self {
        Self::PeerConnected { peer, timestamp: Utc::now() }
    }

    pub fn peer_disconnected(peer: NodeId) -> Self {
        Self::PeerDisconnected { peer, timestamp: Utc::now() }
    }

    pub fn peer_unhealthy(peer: NodeId) -> Self {
        Self::PeerUnhealthy { peer, timestamp: Utc::now() }
    }

    pub fn route_discovered(destination: NodeId, next_hop: NodeId) -> Self {
        Self::RouteDiscovered { destination, next_hop, timestamp: Utc::now() }
    }

    pub fn route_lost(destination: NodeId) -> Self {
        Self::RouteLost { destination, timestamp: Utc::now() }
    }

    pub fn recovery_attempted(peer: NodeId, attempt: u32) -> Self {
        Self::RecoveryAttempted { peer, attempt, timestamp: Utc::now() }
    }

    pub fn recovery_succeeded(peer: NodeId) -> Self {
        Self::RecoverySucceeded { peer, timestamp: Utc::now() }
    }

    pub fn recovery_failed(peer: NodeId) -> Self {
        Self::RecoveryFailed { peer, timestamp: Utc::now() }
    }
}

/// Fixed-capacity ring buffer of recent events, for introspection via the
/// Node Facade's `recent_events()`.
pub struct EventLog {
    events: std::collections::VecDeque<NetworkEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self { events: std::collections::VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, event: NetworkEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<NetworkEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> NodeId {
        NodeId::from_bytes(vec![b]).unwrap()
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut log = EventLog::new(2);
        log.push(NetworkEvent::peer_connected(id(1)));
        log.push(NetworkEvent::peer_connected(id(2)));
        log.push(NetworkEvent::peer_connected(id(3)));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        match &snap[0] {
            NetworkEvent::PeerConnected { peer, .. } => assert_eq!(peer, &id(2)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn constructors_stamp_timestamp() {
        let ev = NetworkEvent::recovery_attempted(id(9), 1);
        assert!(ev.timestamp() <= Utc::now());
    }
}
