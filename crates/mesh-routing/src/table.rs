//! Next-hop routing table: destination → set of next-hop node ids.
//!
//! A next-hop is present only while the Connection Registry reports an
//! authenticated session to it (or while it's being probed via
//! `DiscoverRoute`); stale entries are pruned on forward failure, not on a
//! timer, since liveness is already observed at send time.

use std::collections::HashSet;

use dashmap::DashMap;
use mesh_core::identity::NodeId;

/// Maps destinations to the set of known next hops.
pub struct RoutingTable {
    entries: DashMap<NodeId, HashSet<NodeId>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Record `next_hop` as a way to reach `destination`.
    pub fn learn(&self, destination: NodeId, next_hop: NodeId) {
        self.entries.entry(destination).or_default().insert(next_hop);
    }

    /// All known next hops for a destination, in no particular order.
    pub fn next_hops(&self, destination: &NodeId) -> Vec<NodeId> {
        self.entries.get(destination).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn has_route(&self, destination: &NodeId) -> bool {
        self.entries.get(destination).map(|set| !set.is_empty()).unwrap_or(false)
    }

    /// Drop `next_hop` as a candidate for `destination`, e.g. after a failed
    /// forward. Removes the destination entry entirely once empty.
    pub fn remove_next_hop(&self, destination: &NodeId, next_hop: &NodeId) {
        if let Some(mut set) = self.entries.get_mut(destination) {
            set.remove(next_hop);
            let empty = set.is_empty();
            drop(set);
            if empty {
                self.entries.remove(destination);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> NodeId {
        NodeId::from_bytes(vec![b]).unwrap()
    }

    #[test]
    fn learn_and_lookup() {
        let table = RoutingTable::new();
        table.learn(id(1), id(2));
        assert!(table.has_route(&id(1)));
        assert_eq!(table.next_hops(&id(1)), vec![id(2)]);
    }

    #[test]
    fn multiple_next_hops_accumulate_as_a_set() {
        let table = RoutingTable::new();
        table.learn(id(1), id(2));
        table.learn(id(1), id(3));
        table.learn(id(1), id(2));

        let mut hops = table.next_hops(&id(1));
        hops.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(hops, vec![id(2), id(3)]);
    }

    #[test]
    fn remove_next_hop_drops_empty_destination() {
        let table = RoutingTable::new();
        table.learn(id(1), id(2));
        table.remove_next_hop(&id(1), &id(2));
        assert!(!table.has_route(&id(1)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn unknown_destination_has_no_route() {
        let table = RoutingTable::new();
        assert!(!table.has_route(&id(9)));
        assert!(table.next_hops(&id(9)).is_empty());
    }
}
