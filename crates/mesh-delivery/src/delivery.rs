//! Reliable Delivery Layer: fragments outbound payloads into checksummed
//! 1 MiB chunks, reassembles inbound ones, and drives bounded-retry
//! retransmission.

use std::sync::Arc;

use dashmap::DashMap;
use mesh_core::envelope::{DataBody, EnvelopeBody, GroupId, MessageEnvelope};
use mesh_core::identity::NodeId;
use mesh_routing::RoutingEngine;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::reassembly::ReassemblyBuffer;
use crate::tracker::OutgoingTracker;

pub const CHUNK_SIZE: usize = 1024 * 1024;
const GROUP_TIMEOUT_SECS: i64 = 30;

fn checksum(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Fragments, reassembles, and retransmits payloads, holding a non-owning
/// reference to the [`RoutingEngine`] for both outbound chunks and inbound
/// control replies (acks, retransmit requests, completion).
pub struct ReliableDelivery {
    local_id: NodeId,
    routing: Arc<RoutingEngine>,
    outgoing: DashMap<GroupId, OutgoingTracker>,
    incoming: DashMap<GroupId, ReassemblyBuffer>,
    delivered_tx: mpsc::Sender<(NodeId, Vec<u8>)>,
}

impl ReliableDelivery {
    pub fn new(local_id: NodeId, routing: Arc<RoutingEngine>, delivered_tx: mpsc::Sender<(NodeId, Vec<u8>)>) -> Self {
        Self { local_id, routing, outgoing: DashMap::new(), incoming: DashMap::new(), delivered_tx }
    }

    /// Fragment `bytes` into 1 MiB chunks, register an [`OutgoingTracker`],
    /// and hand each chunk to the routing engine.
    #[instrument(skip(self, bytes), fields(target = %target, len = bytes.len()))]
    pub async fn send(&self, target: NodeId, bytes: Vec<u8>) -> GroupId {
        let group_id = Uuid::new_v4();
        let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect();
        let chunks = if chunks.is_empty() { vec![Vec::new()] } else { chunks };
        let total = chunks.len() as u32;

        let tracker = OutgoingTracker::new(group_id, target.clone(), chunks.clone());
        self.outgoing.insert(group_id, tracker);

        for (index, data) in chunks.into_iter().enumerate() {
            self.send_chunk(target.clone(), group_id, total, index as u32, data).await;
        }

        group_id
    }

    async fn send_chunk(&self, target: NodeId, group_id: GroupId, total: u32, index: u32, data: Vec<u8>) {
        let checksum = checksum(&data);
        let body = DataBody::DataChunk { group_id, total, index, data, checksum };
        let envelope = MessageEnvelope::new(Uuid::new_v4(), self.local_id.clone(), EnvelopeBody::Data(body));
        if let Err(e) = self.routing.route(target, envelope).await {
            warn!(%group_id, index, error = %e, "chunk send failed, retry sweep will retransmit");
        }
    }

    /// Handle an inbound `DataBody` from `sender`.
    #[instrument(skip(self, body), fields(sender = %sender))]
    pub async fn on_data(&self, sender: NodeId, body: DataBody) -> Result<(), DeliveryError> {
        match body {
            DataBody::DataChunk { group_id, total, index, data, checksum: claimed } => {
                self.on_data_chunk(sender, group_id, total, index, data, claimed).await
            }
            DataBody::Acknowledgment { group_id, index } => {
                self.on_acknowledgment(group_id, index);
                Ok(())
            }
            DataBody::RetransmitRequest { group_id, index } => self.on_retransmit_request(group_id, index).await,
            DataBody::Complete { group_id } => {
                self.outgoing.remove(&group_id);
                self.incoming.remove(&group_id);
                Ok(())
            }
        }
    }

    async fn on_data_chunk(
        &self,
        sender: NodeId,
        group_id: GroupId,
        total: u32,
        index: u32,
        data: Vec<u8>,
        claimed_checksum: [u8; 32],
    ) -> Result<(), DeliveryError> {
        if checksum(&data) != claimed_checksum {
            warn!(%group_id, index, "chunk checksum mismatch, requesting retransmit");
            self.send_control(sender, DataBody::RetransmitRequest { group_id, index }).await;
            return Ok(());
        }

        let complete = {
            let mut buffer =
                self.incoming.entry(group_id).or_insert_with(|| ReassemblyBuffer::new(group_id, sender.clone(), total));
            buffer.insert(index, data);
            buffer.is_complete()
        };

        self.send_control(sender.clone(), DataBody::Acknowledgment { group_id, index }).await;

        if complete {
            if let Some((_, buffer)) = self.incoming.remove(&group_id) {
                let assembled = buffer.assemble();
                info!(%group_id, len = assembled.len(), "payload group reassembled");
                let _ = self.delivered_tx.send((sender.clone(), assembled)).await;
                self.send_control(sender, DataBody::Complete { group_id }).await;
            }
        }
        Ok(())
    }

    fn on_acknowledgment(&self, group_id: GroupId, index: u32) {
        let complete = match self.outgoing.get_mut(&group_id) {
            Some(mut tracker) => {
                tracker.ack(index);
                tracker.is_complete()
            }
            None => return,
        };
        if complete {
            debug!(%group_id, "all chunks acknowledged, removing tracker");
            self.outgoing.remove(&group_id);
        }
    }

    async fn on_retransmit_request(&self, group_id: GroupId, index: u32) -> Result<(), DeliveryError> {
        let (target, total, data) = {
            let mut tracker = match self.outgoing.get_mut(&group_id) {
                Some(t) => t,
                None => return Ok(()),
            };
            tracker.retry_count += 1;
            if tracker.exceeded_retries() {
                warn!(%group_id, "retransmit limit exceeded, abandoning group");
                drop(tracker);
                self.outgoing.remove(&group_id);
                return Err(DeliveryError::RetransmitLimitExceeded(group_id.to_string()));
            }
            let Some(chunk) = tracker.chunk(index) else {
                return Ok(());
            };
            (tracker.target.clone(), tracker.total, chunk.to_vec())
        };
        self.send_chunk(target, group_id, total, index, data).await;
        Ok(())
    }

    async fn send_control(&self, target: NodeId, body: DataBody) {
        let envelope = MessageEnvelope::new(Uuid::new_v4(), self.local_id.clone(), EnvelopeBody::Data(body));
        if let Err(e) = self.routing.route(target, envelope).await {
            warn!(error = %e, "control envelope send failed");
        }
    }

    /// Periodic sweep: retransmit unacknowledged chunks past `GROUP_TIMEOUT_SECS`
    /// and discard stale reassembly buffers.
    pub async fn sweep_timeouts(&self) {
        let now = chrono::Utc::now();

        let stale_outgoing: Vec<GroupId> = self
            .outgoing
            .iter()
            .filter(|e| now.signed_duration_since(e.created_at).num_seconds() > GROUP_TIMEOUT_SECS)
            .map(|e| *e.key())
            .collect();

        for group_id in stale_outgoing {
            let Some(mut tracker) = self.outgoing.get_mut(&group_id) else { continue };
            if tracker.exceeded_retries() {
                drop(tracker);
                warn!(%group_id, "timeout sweep abandoning group past retry budget");
                self.outgoing.remove(&group_id);
                continue;
            }

            let target = tracker.target.clone();
            let total = tracker.total;
            let unacked = tracker.unacked_indices();
            let chunks: Vec<(u32, Vec<u8>)> =
                unacked.iter().filter_map(|&i| tracker.chunk(i).map(|c| (i, c.to_vec()))).collect();
            tracker.retry_count += 1;
            drop(tracker);

            for (index, data) in chunks {
                self.send_chunk(target.clone(), group_id, total, index, data).await;
            }
        }

        let stale_incoming: Vec<GroupId> = self
            .incoming
            .iter()
            .filter(|e| now.signed_duration_since(e.created_at).num_seconds() > GROUP_TIMEOUT_SECS)
            .map(|e| *e.key())
            .collect();
        for group_id in stale_incoming {
            debug!(%group_id, "discarding stale reassembly buffer");
            self.incoming.remove(&group_id);
        }
    }

    pub fn pending_outgoing(&self) -> usize {
        self.outgoing.len()
    }

    pub fn pending_incoming(&self) -> usize {
        self.incoming.len()
    }
}
