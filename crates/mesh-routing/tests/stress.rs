//! Stress tests for the routing table and recent-message cache under
//! concurrent access.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mesh_core::identity::NodeId;
use mesh_routing::{RecentMessageCache, RoutingTable};
use uuid::Uuid;

fn id(n: u64) -> NodeId {
    NodeId::from_bytes(n.to_be_bytes().to_vec()).unwrap()
}

#[test]
fn routing_table_throughput() {
    const ROUTE_COUNT: u64 = 10_000;
    let table = Arc::new(RoutingTable::new());

    let start = Instant::now();
    for i in 0..ROUTE_COUNT {
        table.learn(id(i % 500), id(i));
    }
    let insert_duration = start.elapsed();
    println!("learned {ROUTE_COUNT} next hops in {insert_duration:?}");

    assert!(table.len() > 0);
    assert!(insert_duration < Duration::from_secs(5));
}

#[test]
fn concurrent_route_updates_and_removals() {
    let table = Arc::new(RoutingTable::new());
    const THREAD_COUNT: u64 = 10;
    const UPDATES_PER_THREAD: u64 = 1_000;

    let start = Instant::now();
    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..UPDATES_PER_THREAD {
                    let destination = id(t + i % 100);
                    let next_hop = id(i);
                    table.learn(destination.clone(), next_hop.clone());
                    if i % 7 == 0 {
                        table.remove_next_hop(&destination, &next_hop);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    let duration = start.elapsed();
    println!("completed {} concurrent updates in {duration:?}", THREAD_COUNT * UPDATES_PER_THREAD);
    assert!(duration < Duration::from_secs(10));
}

#[test]
fn recent_message_cache_handles_high_volume_without_duplicates() {
    let cache = Arc::new(RecentMessageCache::new());
    const MESSAGE_COUNT: usize = 20_000;

    let ids: Vec<_> = (0..MESSAGE_COUNT).map(|_| Uuid::new_v4()).collect();

    let start = Instant::now();
    for message_id in &ids {
        assert!(!cache.contains(message_id));
        cache.insert(*message_id);
    }
    let duration = start.elapsed();
    println!("inserted {MESSAGE_COUNT} message ids in {duration:?}");

    for message_id in &ids {
        assert!(cache.contains(message_id));
    }
    assert_eq!(cache.len(), MESSAGE_COUNT);
    assert!(duration < Duration::from_secs(5));
}

#[test]
fn multipath_candidates_accumulate_across_many_learns() {
    let table = Arc::new(RoutingTable::new());
    let destination = id(1);

    for next_hop in 2..102 {
        table.learn(destination.clone(), id(next_hop));
    }

    let hops = table.next_hops(&destination);
    assert_eq!(hops.len(), 100);
}
