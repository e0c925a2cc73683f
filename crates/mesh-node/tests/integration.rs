//! End-to-end scenarios exercising the composed [`Node`] facade over real
//! loopback TCP and UDP sockets. No mocked transport: every test dials
//! `127.0.0.1` on an OS-assigned port the way an embedding application
//! would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mesh_core::envelope::{DataBody, EnvelopeBody, MessageEnvelope, RoutingEnvelope, RoutingStrategy};
use mesh_core::error::NoRouteError;
use mesh_core::event::{EventLog, NetworkEvent};
use mesh_core::identity::NodeId;
use mesh_crypto::SignatureService;
use mesh_delivery::ReliableDelivery;
use mesh_node::{Node, NodeConfig};
use mesh_routing::RoutingEngine;
use mesh_transport::{ConnectionRegistry, DiscoveryConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral udp port");
    socket.local_addr().unwrap().port()
}

/// A `NodeConfig` bound to loopback with a kernel-assigned TCP port and a
/// fresh UDP discovery port, so many nodes can coexist in one test binary.
fn node_config() -> NodeConfig {
    NodeConfig::default()
        .with_bind_addr("127.0.0.1", 0)
        .with_discovery(DiscoveryConfig { port: free_udp_port(), ..DiscoveryConfig::default() })
}

async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return check();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn count_peer_connected(events: &[NetworkEvent], peer: &NodeId) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, NetworkEvent::PeerConnected { peer: p, .. } if p == peer))
        .count()
}

// Scenario 1: two-node handshake.
#[tokio::test]
async fn two_node_handshake_authenticates_both_sides_and_emits_peer_connected() {
    let a = Node::new(node_config());
    let b = Node::new(node_config());
    a.start().await.unwrap();
    b.start().await.unwrap();

    let b_addr = b.local_addr().expect("b bound a tcp listener");
    let b_id = a.connect("127.0.0.1", b_addr.port()).await.unwrap();
    assert_eq!(b_id, b.node_id());

    assert!(wait_until(Duration::from_secs(2), || a.all_peers().len() == 1).await);
    assert!(wait_until(Duration::from_secs(2), || b.all_peers().len() == 1).await);
    assert!(a.is_connected(&b.node_id()));
    assert!(b.is_connected(&a.node_id()));

    assert!(wait_until(Duration::from_secs(2), || count_peer_connected(&a.recent_events(), &b_id) == 1).await);
    assert!(wait_until(Duration::from_secs(2), || count_peer_connected(&b.recent_events(), &a.node_id()) == 1).await);

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

async fn connected_pair() -> (Arc<Node>, Arc<Node>) {
    let a = Node::new(node_config());
    let b = Node::new(node_config());
    a.start().await.unwrap();
    b.start().await.unwrap();
    let b_addr = b.local_addr().unwrap();
    a.connect("127.0.0.1", b_addr.port()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || a.is_connected(&b.node_id())).await);
    (a, b)
}

// Scenario 2: direct delivery, single chunk.
#[tokio::test]
async fn direct_delivery_fires_callback_once_with_no_retransmission() {
    let (a, b) = connected_pair().await;

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    let fire_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let fire_count_clone = fire_count.clone();
    b.set_on_message_delivered(move |_from, bytes| {
        *received_clone.lock() = bytes;
        fire_count_clone.fetch_add(1, Ordering::SeqCst);
    });

    let payload = vec![7u8; 1500];
    a.send(b.node_id(), payload.clone()).await;

    assert!(wait_until(Duration::from_secs(2), || fire_count.load(Ordering::SeqCst) == 1).await);
    assert_eq!(*received.lock(), payload);
    assert_eq!(fire_count.load(Ordering::SeqCst), 1);

    assert!(
        wait_until(Duration::from_secs(2), || a.pending_outgoing() == 0).await,
        "tracker must be removed once acked"
    );

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

// Scenario 3: fragmentation into three chunks (1 MiB, 1 MiB, ~476 KiB).
#[tokio::test]
async fn large_payload_fragments_into_three_chunks_and_reassembles_exactly() {
    let (a, b) = connected_pair().await;

    let len = 2_500_000usize;
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

    let received_len = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    let received_len_clone = received_len.clone();
    b.set_on_message_delivered(move |_from, bytes| {
        received_len_clone.store(bytes.len(), Ordering::SeqCst);
        *received_clone.lock() = bytes;
    });

    a.send(b.node_id(), payload.clone()).await;

    assert!(wait_until(Duration::from_secs(5), || received_len.load(Ordering::SeqCst) == len).await);
    assert_eq!(*received.lock(), payload);

    assert!(
        wait_until(Duration::from_secs(2), || a.pending_outgoing() == 0).await,
        "all three chunks must be acknowledged"
    );

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

// Scenario 4: checksum recovery.
//
// Loopback TCP won't corrupt bytes on its own, so this exercises the
// Reliable Delivery Layer and Routing Engine the way the Node Facade
// composes them, with a demultiplexing pump that flips a bit in chunk
// index 1 on first receipt — the same technique `mesh-delivery`'s own
// fault-injection suite uses, here proving the composed path recovers too.
struct PumpedNode {
    id: NodeId,
    addr: std::net::SocketAddr,
    connections: Arc<ConnectionRegistry>,
    delivery: Arc<ReliableDelivery>,
    delivered_rx: mpsc::Receiver<(NodeId, Vec<u8>)>,
}

async fn spawn_pumped_node(corrupt_index_one: Option<Arc<AtomicBool>>) -> PumpedNode {
    let sig = Arc::new(SignatureService::generate());
    let id = sig.node_id();
    let (inbound_tx, mut inbound_rx) = mpsc::channel(64);
    let events = Arc::new(Mutex::new(EventLog::new(64)));
    let connections = ConnectionRegistry::new(id.clone(), sig, inbound_tx, events.clone());
    let addr = connections.listen("127.0.0.1:0").await.unwrap();

    let routing = Arc::new(RoutingEngine::new(id.clone(), connections.clone(), events));
    let (delivered_tx, delivered_rx) = mpsc::channel(64);
    let delivery = Arc::new(ReliableDelivery::new(id.clone(), routing.clone(), delivered_tx));

    let pump_delivery = delivery.clone();
    let pump_routing = routing.clone();
    let pump_id = id.clone();
    tokio::spawn(async move {
        while let Some((from, envelope)) = inbound_rx.recv().await {
            match envelope.body {
                EnvelopeBody::Data(body) => {
                    let _ = pump_delivery.on_data(from, body).await;
                }
                EnvelopeBody::Routing(renv) => {
                    if renv.target_id == pump_id {
                        if let EnvelopeBody::Data(mut body) = renv.payload.body.clone() {
                            if let (Some(flag), DataBody::DataChunk { index, data, .. }) = (&corrupt_index_one, &mut body) {
                                if *index == 1 && flag.swap(false, Ordering::SeqCst) {
                                    data[0] ^= 0xFF;
                                }
                            }
                            let sender = renv.payload.sender_id.clone();
                            let _ = pump_delivery.on_data(sender, body).await;
                        }
                    } else {
                        let _ = pump_routing.handle_routing(renv, Some(from)).await;
                    }
                }
                _ => {}
            }
        }
    });

    PumpedNode { id, addr, connections, delivery, delivered_rx }
}

#[tokio::test]
async fn corrupted_chunk_is_retransmitted_and_recovers_the_original_bytes() {
    let a = spawn_pumped_node(None).await;
    let corrupt_flag = Arc::new(AtomicBool::new(true));
    let mut b = spawn_pumped_node(Some(corrupt_flag)).await;

    let resolved = a.connections.connect(b.addr).await.unwrap();
    assert_eq!(resolved, b.id);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Three chunks so index 1 (the one the pump corrupts) exists.
    let payload: Vec<u8> = (0..(mesh_delivery::CHUNK_SIZE * 2 + 1000)).map(|i| (i % 255) as u8).collect();
    a.delivery.send(b.id.clone(), payload.clone()).await;

    let (from, assembled) = tokio::time::timeout(Duration::from_secs(5), b.delivered_rx.recv())
        .await
        .expect("delivery timed out")
        .expect("channel closed");

    assert_eq!(from, a.id);
    assert_eq!(assembled, payload, "reassembled bytes must match the original after recovery");

    assert!(wait_until(Duration::from_secs(2), || a.delivery.pending_outgoing() == 0).await);
}

// Scenario 5: loop suppression on flood.
//
// A three-node full mesh (A-B, B-C, A-C all peered) means a flooded
// envelope can reach a node by more than one path; the RecentMessageCache
// inside each RoutingEngine must drop the second arrival rather than
// re-forward it. `handle_routing`'s own return value exposes this: the
// first arrival of a message-id dispatches normally, any later arrival of
// the same message-id comes back `Err(NoRouteError::Duplicate)`.
struct RingNode {
    id: NodeId,
    addr: std::net::SocketAddr,
    connections: Arc<ConnectionRegistry>,
    routing: Arc<RoutingEngine>,
}

async fn spawn_ring_node() -> RingNode {
    let sig = Arc::new(SignatureService::generate());
    let id = sig.node_id();
    let (inbound_tx, mut inbound_rx) = mpsc::channel(64);
    let events = Arc::new(Mutex::new(EventLog::new(64)));
    let connections = ConnectionRegistry::new(id.clone(), sig, inbound_tx, events.clone());
    let addr = connections.listen("127.0.0.1:0").await.unwrap();

    let routing = Arc::new(RoutingEngine::new(id.clone(), connections.clone(), events));

    let pump_routing = routing.clone();
    tokio::spawn(async move {
        while let Some((from, envelope)) = inbound_rx.recv().await {
            if let EnvelopeBody::Routing(renv) = envelope.body {
                let _ = pump_routing.handle_routing(renv, Some(from)).await;
            }
        }
    });

    RingNode { id, addr, connections, routing }
}

#[tokio::test]
async fn flood_reaches_every_node_at_most_once_in_a_full_mesh() {
    let a = spawn_ring_node().await;
    let b = spawn_ring_node().await;
    let c = spawn_ring_node().await;

    a.connections.connect(b.addr).await.unwrap();
    a.connections.connect(c.addr).await.unwrap();
    b.connections.connect(c.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(a.connections.all_peers().len(), 2);
    assert_eq!(b.connections.all_peers().len(), 2);
    assert_eq!(c.connections.all_peers().len(), 2);

    // A nonexistent target forces every hop to keep flooding instead of
    // short-circuiting on local delivery.
    let nonexistent = NodeId::from_bytes(vec![0xFFu8; 32]).unwrap();
    let msg = MessageEnvelope::new(
        Uuid::new_v4(),
        a.id.clone(),
        EnvelopeBody::Data(DataBody::Complete { group_id: Uuid::new_v4() }),
    );
    let message_id = msg.message_id;
    let envelope = RoutingEnvelope::new(nonexistent.clone(), a.id.clone(), msg.clone(), RoutingStrategy::Flood);

    // A originates the flood the same way `route()` would with no known
    // route to `nonexistent`.
    a.routing.route(nonexistent, msg).await.expect("flood from a fully meshed origin always finds a peer");

    tokio::time::sleep(Duration::from_millis(200)).await;

    // Re-deliver the original envelope (route still just `[a]`) directly to
    // every node. B and C already hold `message_id` in their
    // RecentMessageCache from forwarding it above, so they reject it there;
    // A never ran it through `handle_routing` for its own origination, but
    // the route already contains A, so `append_hop` rejects it as a loop.
    // Both are `NoRouteError::Duplicate` — the two suppression paths the
    // Routing Engine offers.
    for node in [&a, &b, &c] {
        let result = node.routing.handle_routing(envelope.clone(), None).await;
        assert!(
            matches!(result, Err(NoRouteError::Duplicate)),
            "node {:?} must not re-forward message {message_id}",
            node.id
        );
    }
}

// Scenario 6: bounded reconnection. Exercises the real 30 s health timeout
// and the full 2/4/8/16/32 s backoff ladder, so it intentionally takes
// about a minute and a half of wall clock; run explicitly with
// `cargo test -- --ignored` rather than as part of the default suite.
#[tokio::test]
#[ignore = "exercises the real liveness backoff ladder, ~90s wall clock"]
async fn bounded_reconnection_stops_after_five_attempts_and_emits_recovery_failed() {
    let a = Node::new(node_config());
    let b = Node::new(node_config());
    a.start().await.unwrap();
    b.start().await.unwrap();

    let b_addr = b.local_addr().unwrap();
    let b_id = a.connect("127.0.0.1", b_addr.port()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || a.is_connected(&b_id)).await);

    b.stop().await.unwrap();

    let recovery_failed = wait_until(Duration::from_secs(95), || {
        a.recent_events()
            .iter()
            .any(|e| matches!(e, NetworkEvent::RecoveryFailed { peer, .. } if *peer == b_id))
    })
    .await;
    assert!(recovery_failed, "expected RecoveryFailed after exhausting the reconnection budget");

    let attempts = a
        .recent_events()
        .iter()
        .filter(|e| matches!(e, NetworkEvent::RecoveryAttempted { peer, .. } if *peer == b_id))
        .count();
    assert_eq!(attempts, 5, "exactly five reconnection attempts before giving up");

    a.stop().await.unwrap();
}
