//! Wire-level message types: the common envelope header plus each kind's
//! body, and the routing envelope that wraps a payload while it crosses the
//! overlay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{NodeId, PeerRecord};

pub type MessageId = Uuid;
pub type GroupId = Uuid;

/// Common header plus kind-specific body. The tag on [`EnvelopeBody`] is the
/// "kind" field from the data model — dispatch is switch-over-tag, never a
/// virtual call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: MessageId,
    pub sender_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub body: EnvelopeBody,
}

impl MessageEnvelope {
    pub fn new(message_id: MessageId, sender_id: NodeId, body: EnvelopeBody) -> Self {
        Self { message_id, sender_id, timestamp: Utc::now(), body }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnvelopeBody {
    HandshakeInit(HandshakeInit),
    HandshakeResponse(HandshakeResponse),
    HandshakeConfirm(HandshakeConfirm),
    Data(DataBody),
    Routing(RoutingEnvelope),
    Discovery(DiscoveryBody),
}

/// First handshake message: a fresh challenge plus a signature over the
/// sender's own id, proving possession of the matching private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeInit {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub challenge: [u8; 32],
}

/// Second handshake message: the acceptor's own challenge plus an echo of
/// the initiator's challenge and a signature proving the acceptor saw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub challenge: [u8; 32],
    pub challenge_echo: [u8; 32],
}

/// Third handshake message: proof the initiator saw the acceptor's
/// challenge. Carries no new challenge — the exchange terminates here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfirm {
    pub signature: Vec<u8>,
    pub challenge_echo: [u8; 32],
}

/// Reliable-delivery chunk traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataBody {
    DataChunk {
        group_id: GroupId,
        total: u32,
        index: u32,
        data: Vec<u8>,
        checksum: [u8; 32],
    },
    Acknowledgment {
        group_id: GroupId,
        index: u32,
    },
    RetransmitRequest {
        group_id: GroupId,
        index: u32,
    },
    Complete {
        group_id: GroupId,
    },
}

/// Forwarding policy applied to a [`RoutingEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStrategy {
    Direct,
    Flood,
    Multipath,
    DiscoverRoute,
}

/// Wraps a payload envelope while it crosses the overlay, carrying the
/// route taken so far for loop suppression and path learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEnvelope {
    pub target_id: NodeId,
    pub route: Vec<NodeId>,
    pub payload: Box<MessageEnvelope>,
    pub strategy: RoutingStrategy,
}

impl RoutingEnvelope {
    pub fn new(
        target_id: NodeId,
        origin: NodeId,
        payload: MessageEnvelope,
        strategy: RoutingStrategy,
    ) -> Self {
        Self { target_id, route: vec![origin], payload: Box::new(payload), strategy }
    }

    /// `len(route) - 1`, per the glossary.
    pub fn hop_count(&self) -> usize {
        self.route.len().saturating_sub(1)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.route.contains(id)
    }

    /// Append `id` to the route. Returns `false` (and leaves the route
    /// untouched) if `id` is already present — callers must treat that as a
    /// loop and drop the envelope rather than forward it.
    #[must_use]
    pub fn append_hop(&mut self, id: NodeId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.route.push(id);
        true
    }
}

/// UDP discovery traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoveryBody {
    DiscoveryRequest,
    DiscoveryResponse { host: String, service_port: u16 },
    PeerListRequest,
    PeerListResponse { peers: Vec<PeerRecord> },
}
