//! Routing Engine: first-hop dispatch and multi-hop forwarding over the
//! overlay.
//!
//! ## Strategies
//!
//! 1. **Direct**: forward to a single known next hop.
//! 2. **Flood**: forward to every authenticated peer not already on the
//!    route.
//! 3. **Multipath**: forward to up to three distinct known next hops.
//! 4. **DiscoverRoute**: learn the path the envelope already travelled,
//!    then continue forwarding it toward the target.

use std::sync::Arc;

use mesh_core::envelope::{EnvelopeBody, MessageEnvelope, RoutingEnvelope, RoutingStrategy};
use mesh_core::error::NoRouteError;
use mesh_core::event::{EventLog, NetworkEvent};
use mesh_core::identity::NodeId;
use mesh_transport::ConnectionRegistry;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::recent::RecentMessageCache;
use crate::table::RoutingTable;

/// Hop count at which an envelope is dropped regardless of strategy.
const MAX_HOPS: usize = 10;

/// Up to this many distinct next hops are used for a Multipath forward.
const MULTIPATH_FANOUT: usize = 3;

/// Decides how an envelope crosses the overlay and drives the forward.
pub struct RoutingEngine {
    local_id: NodeId,
    connections: Arc<ConnectionRegistry>,
    routing_table: RoutingTable,
    recent_messages: RecentMessageCache,
    events: Arc<Mutex<EventLog>>,
}

impl RoutingEngine {
    pub fn new(local_id: NodeId, connections: Arc<ConnectionRegistry>, events: Arc<Mutex<EventLog>>) -> Self {
        Self {
            local_id,
            connections,
            routing_table: RoutingTable::new(),
            recent_messages: RecentMessageCache::new(),
            events,
        }
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Evict message-ids older than five minutes from the loop/duplicate
    /// suppression cache. Intended to be called periodically from a
    /// scheduled sweep; see [`crate::recent::RecentMessageCache::expire_old`].
    pub fn expire_recent_messages(&self) {
        self.recent_messages.expire_old();
    }

    /// First-hop entrypoint: deliver locally if `target_id` is us, otherwise
    /// pick a strategy and dispatch.
    #[instrument(skip(self, payload), fields(target = %target_id, message_id = %payload.message_id))]
    pub async fn route(&self, target_id: NodeId, payload: MessageEnvelope) -> Result<(), NoRouteError> {
        if target_id == self.local_id {
            debug!("target is local, nothing to route");
            return Ok(());
        }

        let strategy = if self.routing_table.has_route(&target_id) {
            RoutingStrategy::Direct
        } else {
            RoutingStrategy::Flood
        };

        let envelope = RoutingEnvelope::new(target_id, self.local_id.clone(), payload, strategy);
        self.dispatch(envelope, None).await
    }

    /// Process an envelope arriving from `inbound_peer` (`None` if locally
    /// originated). Applies loop/duplicate suppression, TTL enforcement,
    /// local delivery, then dispatches per the envelope's strategy.
    #[instrument(skip(self, envelope), fields(target = %envelope.target_id, hops = envelope.hop_count()))]
    pub async fn handle_routing(
        &self,
        mut envelope: RoutingEnvelope,
        inbound_peer: Option<NodeId>,
    ) -> Result<(), NoRouteError> {
        let message_id = envelope.payload.message_id;

        if self.recent_messages.contains(&message_id) {
            trace!(%message_id, "duplicate or looped message, dropping");
            return Err(NoRouteError::Duplicate);
        }
        self.recent_messages.insert(message_id);

        if envelope.hop_count() >= MAX_HOPS {
            warn!(%message_id, hops = envelope.hop_count(), "hop count exceeded, dropping");
            return Err(NoRouteError::HopCountExceeded(message_id.to_string()));
        }

        if envelope.target_id == self.local_id {
            debug!(%message_id, "delivering locally");
            return self.deliver_local(*envelope.payload).await;
        }

        let local_id = self.local_id.clone();
        if !envelope.append_hop(local_id) {
            trace!(%message_id, "local id already on route, dropping");
            return Err(NoRouteError::Duplicate);
        }

        self.dispatch(envelope, inbound_peer).await
    }

    async fn deliver_local(&self, _payload: MessageEnvelope) -> Result<(), NoRouteError> {
        Ok(())
    }

    async fn dispatch(&self, envelope: RoutingEnvelope, inbound_peer: Option<NodeId>) -> Result<(), NoRouteError> {
        match envelope.strategy {
            RoutingStrategy::Direct => self.dispatch_direct(envelope).await,
            RoutingStrategy::Flood => self.dispatch_flood(envelope, inbound_peer).await,
            RoutingStrategy::Multipath => self.dispatch_multipath(envelope).await,
            RoutingStrategy::DiscoverRoute => self.dispatch_discover_route(envelope).await,
        }
    }

    async fn dispatch_direct(&self, envelope: RoutingEnvelope) -> Result<(), NoRouteError> {
        let candidates = self.routing_table.next_hops(&envelope.target_id);
        let Some(next_hop) = candidates.into_iter().next() else {
            return Err(NoRouteError::NoRoute(envelope.target_id.to_string()));
        };
        self.forward_to(next_hop, &envelope).await
    }

    async fn dispatch_flood(
        &self,
        envelope: RoutingEnvelope,
        inbound_peer: Option<NodeId>,
    ) -> Result<(), NoRouteError> {
        let mut forwarded = false;
        for peer in self.connections.all_peers() {
            if Some(&peer) == inbound_peer.as_ref() || envelope.contains(&peer) {
                continue;
            }
            if self.forward_to(peer, &envelope).await.is_ok() {
                forwarded = true;
            }
        }

        if forwarded {
            Ok(())
        } else {
            Err(NoRouteError::NoRoute(envelope.target_id.to_string()))
        }
    }

    async fn dispatch_multipath(&self, envelope: RoutingEnvelope) -> Result<(), NoRouteError> {
        let candidates = self.routing_table.next_hops(&envelope.target_id);
        if candidates.is_empty() {
            return Err(NoRouteError::NoRoute(envelope.target_id.to_string()));
        }

        let mut forwarded = false;
        for next_hop in candidates.into_iter().take(MULTIPATH_FANOUT) {
            if self.forward_to(next_hop, &envelope).await.is_ok() {
                forwarded = true;
            }
        }

        if forwarded {
            Ok(())
        } else {
            Err(NoRouteError::NoRoute(envelope.target_id.to_string()))
        }
    }

    /// Learn every adjacent hop pair in the route so far, then keep
    /// forwarding toward the target with a Direct attempt.
    async fn dispatch_discover_route(&self, envelope: RoutingEnvelope) -> Result<(), NoRouteError> {
        for pair in envelope.route.windows(2) {
            let (from, to) = (pair[0].clone(), pair[1].clone());
            self.routing_table.learn(from.clone(), to.clone());
            info!(destination = %from, next_hop = %to, "route learned via discovery");
            self.events.lock().push(NetworkEvent::route_discovered(from, to));
        }

        if envelope.target_id == self.local_id {
            return Ok(());
        }

        self.dispatch_direct(envelope).await
    }

    async fn forward_to(&self, next_hop: NodeId, envelope: &RoutingEnvelope) -> Result<(), NoRouteError> {
        let wrapped = MessageEnvelope::new(
            envelope.payload.message_id,
            self.local_id.clone(),
            EnvelopeBody::Routing(envelope.clone()),
        );

        match self.connections.send_to(&next_hop, &wrapped).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%next_hop, error = %e, "forward failed, dropping route");
                self.routing_table.remove_next_hop(&envelope.target_id, &next_hop);
                self.events.lock().push(NetworkEvent::route_lost(envelope.target_id.clone()));
                Err(NoRouteError::NoRoute(next_hop.to_string()))
            }
        }
    }
}
