//! Outgoing chunk-group tracking: one [`OutgoingTracker`] per payload this
//! node is sending, retained until every chunk is acknowledged or the
//! retry budget is exhausted.

use chrono::{DateTime, Utc};
use mesh_core::envelope::GroupId;
use mesh_core::identity::NodeId;

/// Chunks beyond this many retransmissions cause the group to be abandoned.
pub const MAX_RETRIES: u32 = 3;

/// Tracks acknowledgement state for one outgoing payload group. Retains the
/// original chunk bytes so a `RetransmitRequest` can be answered with the
/// exact bytes sent the first time, rather than re-fragmenting.
pub struct OutgoingTracker {
    pub group_id: GroupId,
    pub target: NodeId,
    pub total: u32,
    pub chunks: Vec<Vec<u8>>,
    acked: Vec<bool>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl OutgoingTracker {
    pub fn new(group_id: GroupId, target: NodeId, chunks: Vec<Vec<u8>>) -> Self {
        let total = chunks.len() as u32;
        Self { group_id, target, total, chunks, acked: vec![false; total as usize], retry_count: 0, created_at: Utc::now() }
    }

    /// Mark `index` acknowledged. Idempotent: acking an already-set index is
    /// a no-op.
    pub fn ack(&mut self, index: u32) {
        if let Some(bit) = self.acked.get_mut(index as usize) {
            *bit = true;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.acked.iter().all(|&b| b)
    }

    pub fn unacked_indices(&self) -> Vec<u32> {
        self.acked.iter().enumerate().filter(|&(_, &acked)| !acked).map(|(i, _)| i as u32).collect()
    }

    pub fn chunk(&self, index: u32) -> Option<&[u8]> {
        self.chunks.get(index as usize).map(Vec::as_slice)
    }

    pub fn exceeded_retries(&self) -> bool {
        self.retry_count > MAX_RETRIES
    }
}
