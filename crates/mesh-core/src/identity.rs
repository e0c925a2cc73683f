//! Peer identity and address records.
//!
//! A [`NodeId`] is an opaque handle over a peer's post-quantum public key.
//! Nodes never compare identities by transport address — only by the bytes
//! of their verifying key — so a peer that changes its IP keeps its
//! identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Opaque identifier for a peer, derived from its signature verifying key.
///
/// Equality and hashing are over the raw key bytes. Display renders a short,
/// human-legible prefix (hex of the first 8 bytes) for logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// Wrap raw verifying-key bytes as a `NodeId`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, IdentityError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(IdentityError::InvalidFormat("empty node id".into()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex of the first 8 bytes, for logging.
    pub fn short_id(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(8)])
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for NodeId {}

/// Ordered by raw key bytes. Used only to pick a deterministic winner when
/// two peers dial each other simultaneously, never for routing decisions.
impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for NodeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short_id())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

/// A peer's advertised reachability and identity, as learned via discovery
/// or handshake. Immutable after construction: refreshing a record means
/// building a new one with [`PeerRecord::new`], not mutating this one in
/// place.
///
/// `last_seen_millis` is bookkeeping for stale-peer sweeps, not part of the
/// record's identity — two records are equal iff `node_id`, `host`, and
/// `port` all match, regardless of when each was last seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    /// Unix millis of the last time this record was (re)constructed.
    pub last_seen_millis: i64,
}

impl PeerRecord {
    pub fn new(node_id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self { node_id, host: host.into(), port, last_seen_millis: chrono::Utc::now().timestamp_millis() }
    }
}

impl PartialEq for PeerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && self.host == other.host && self.port == other.port
    }
}
impl Eq for PeerRecord {}
