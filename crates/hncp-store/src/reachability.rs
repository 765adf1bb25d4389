//! Reachability walk over published adjacencies.
//!
//! A node is reachable if a path of neighbor records leads to it from the
//! local node. By default an edge X→Y counts only if Y publishes the reverse
//! record as well, so one-way adjacencies do not keep a node alive. Setting
//! `assume_bidirectional` counts every published edge.

use std::collections::{BTreeSet, VecDeque};

use hncp_core::NodeIdentifier;

use crate::traits::NodeStore;

/// The set of nodes reachable from the local node, self included.
pub fn reachable_nodes<S: NodeStore + ?Sized>(
    store: &S,
    assume_bidirectional: bool,
) -> BTreeSet<NodeIdentifier> {
    let own = store.own_id();
    let mut seen = BTreeSet::from([own]);
    let mut queue = VecDeque::from([own]);

    while let Some(current) = queue.pop_front() {
        let Some(node) = store.get(&current) else {
            continue;
        };
        for edge in node.neighbors() {
            if seen.contains(&edge.neighbor) {
                continue;
            }
            let Some(peer) = store.get(&edge.neighbor) else {
                continue;
            };
            let reverse = edge.reverse(current);
            if assume_bidirectional || peer.neighbors().any(|r| r == reverse) {
                seen.insert(edge.neighbor);
                queue.push_back(edge.neighbor);
            }
        }
    }

    seen
}

/// Remote nodes in the store that the walk did not reach.
pub fn unreachable_nodes<S: NodeStore + ?Sized>(
    store: &S,
    assume_bidirectional: bool,
) -> Vec<NodeIdentifier> {
    let reachable = reachable_nodes(store, assume_bidirectional);
    store
        .nodes()
        .map(|n| *n.identifier())
        .filter(|id| !reachable.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use hncp_core::{NeighborRecord, Record, TlvSet};

    fn id(name: &str) -> NodeIdentifier {
        NodeIdentifier::derive(name.as_bytes())
    }

    fn edges(list: &[(NodeIdentifier, u32, u32)]) -> TlvSet {
        list.iter()
            .map(|&(neighbor, link_id, neighbor_link_id)| {
                NeighborRecord {
                    neighbor,
                    link_id,
                    neighbor_link_id,
                }
                .to_tlv()
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_bidirectional_chain_reachable() {
        let (a, b, c) = (id("a"), id("b"), id("c"));
        let mut store = MemoryStore::new(a, 0);
        store.publish_self(edges(&[(b, 1, 1)]), 0);
        store.upsert(b, 1, 0, edges(&[(a, 1, 1), (c, 2, 1)])).unwrap();
        store.upsert(c, 1, 0, edges(&[(b, 1, 2)])).unwrap();

        assert_eq!(reachable_nodes(&store, false), BTreeSet::from([a, b, c]));
        assert!(unreachable_nodes(&store, false).is_empty());
    }

    #[test]
    fn test_one_way_edge_needs_flag() {
        let (a, b) = (id("a"), id("b"));
        let mut store = MemoryStore::new(a, 0);
        store.publish_self(edges(&[(b, 1, 1)]), 0);
        store.upsert(b, 1, 0, TlvSet::new()).unwrap();

        assert_eq!(unreachable_nodes(&store, false), vec![b]);
        assert!(unreachable_nodes(&store, true).is_empty());
    }

    #[test]
    fn test_reverse_must_match_link_ids() {
        let (a, b) = (id("a"), id("b"));
        let mut store = MemoryStore::new(a, 0);
        store.publish_self(edges(&[(b, 1, 7)]), 0);
        store.upsert(b, 1, 0, edges(&[(a, 8, 1)])).unwrap();

        assert_eq!(unreachable_nodes(&store, false), vec![b]);
    }

    #[test]
    fn test_island_unreachable() {
        let (a, x, y) = (id("a"), id("x"), id("y"));
        let mut store = MemoryStore::new(a, 0);
        store.upsert(x, 1, 0, edges(&[(y, 1, 1)])).unwrap();
        store.upsert(y, 1, 0, edges(&[(x, 1, 1)])).unwrap();

        let mut lost = unreachable_nodes(&store, false);
        lost.sort();
        let mut expected = vec![x, y];
        expected.sort();
        assert_eq!(lost, expected);
    }
}
