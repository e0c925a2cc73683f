//! Inbound chunk-group reassembly: one [`ReassemblyBuffer`] per payload
//! group currently being received.

use chrono::{DateTime, Utc};
use mesh_core::envelope::GroupId;
use mesh_core::identity::NodeId;

pub struct ReassemblyBuffer {
    pub group_id: GroupId,
    pub sender: NodeId,
    pub total: u32,
    chunks: Vec<Option<Vec<u8>>>,
    received_count: usize,
    pub created_at: DateTime<Utc>,
}

impl ReassemblyBuffer {
    pub fn new(group_id: GroupId, sender: NodeId, total: u32) -> Self {
        Self { group_id, sender, total, chunks: vec![None; total as usize], received_count: 0, created_at: Utc::now() }
    }

    /// Insert a chunk's bytes at `index`. A re-delivery of an already-filled
    /// index does not double-count toward completion.
    pub fn insert(&mut self, index: u32, data: Vec<u8>) {
        if let Some(slot) = self.chunks.get_mut(index as usize) {
            if slot.is_none() {
                self.received_count += 1;
            }
            *slot = Some(data);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.chunks.len()
    }

    /// Concatenate chunks in index order. Only meaningful once complete.
    pub fn assemble(&self) -> Vec<u8> {
        self.chunks.iter().flatten().flat_map(|c| c.iter().copied()).collect()
    }
}
