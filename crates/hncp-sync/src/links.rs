//! Local links and the neighbors observed on them.
//!
//! Links are owned by the [`LinkManager`] and referred to everywhere else by
//! their interface id. Each link owns its neighbor table, keyed by the remote
//! node and the remote interface id, so a neighbor is never owned twice.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;

use hncp_core::{NeighborRecord, NodeIdentifier};

use crate::error::{Result, SyncError};
use crate::trickle::Trickle;

/// A neighbor seen on one of our links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub node: NodeIdentifier,
    /// The neighbor's own interface id for the shared link.
    pub remote_link_id: u32,
    pub address: Ipv6Addr,
    pub last_heard: i64,
    /// A liveness probe was sent and not yet answered.
    pub probed: bool,
}

/// Outcome of hearing from a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborEvent {
    Discovered,
    Refreshed,
}

/// Liveness action the engine must take for a neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessAction {
    /// Unheard for half the timeout: send a unicast probe.
    Probe { link: u32, neighbor: Neighbor },
    /// Unheard for the full timeout: dropped from the table.
    Dropped { link: u32, neighbor: Neighbor },
}

/// One local interface taking part in the protocol.
#[derive(Debug, Clone)]
pub struct Link {
    name: String,
    id: u32,
    address: Ipv6Addr,
    pub(crate) trickle: Trickle,
    neighbors: BTreeMap<(NodeIdentifier, u32), Neighbor>,
}

impl Link {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interface id, as published in neighbor and link-id records.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> Ipv6Addr {
        self.address
    }

    pub fn trickle(&self) -> &Trickle {
        &self.trickle
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> + '_ {
        self.neighbors.values()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }
}

/// Owner of all links. Interface ids start at 1 and are never reused.
#[derive(Debug, Clone)]
pub struct LinkManager {
    links: BTreeMap<u32, Link>,
    by_name: HashMap<String, u32>,
    next_id: u32,
}

impl Default for LinkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkManager {
    pub fn new() -> Self {
        Self {
            links: BTreeMap::new(),
            by_name: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a link and return its interface id.
    pub fn enable(&mut self, name: &str, address: Ipv6Addr, trickle: Trickle) -> Result<u32> {
        if self.by_name.contains_key(name) {
            return Err(SyncError::DuplicateLink(name.to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.links.insert(
            id,
            Link {
                name: name.to_string(),
                id,
                address,
                trickle,
                neighbors: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Remove a link together with its neighbors.
    pub fn disable(&mut self, name: &str) -> Result<Link> {
        let id = self
            .by_name
            .remove(name)
            .ok_or_else(|| SyncError::UnknownLink(name.to_string()))?;
        self.links
            .remove(&id)
            .ok_or_else(|| SyncError::UnknownLink(name.to_string()))
    }

    pub fn get(&self, id: u32) -> Option<&Link> {
        self.links.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Link> {
        self.by_name.get(name).and_then(|id| self.links.get(id))
    }

    /// Links in interface id order.
    pub fn iter(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> + '_ {
        self.links.values_mut()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Record that a neighbor was heard on a link.
    pub fn observe(
        &mut self,
        link: u32,
        node: NodeIdentifier,
        remote_link_id: u32,
        address: Ipv6Addr,
        now: i64,
    ) -> Result<NeighborEvent> {
        let link = self
            .links
            .get_mut(&link)
            .ok_or_else(|| SyncError::UnknownLink(link.to_string()))?;

        match link.neighbors.get_mut(&(node, remote_link_id)) {
            Some(neighbor) => {
                neighbor.address = address;
                neighbor.last_heard = now;
                neighbor.probed = false;
                Ok(NeighborEvent::Refreshed)
            }
            None => {
                link.neighbors.insert(
                    (node, remote_link_id),
                    Neighbor {
                        node,
                        remote_link_id,
                        address,
                        last_heard: now,
                        probed: false,
                    },
                );
                Ok(NeighborEvent::Discovered)
            }
        }
    }

    /// The neighbor records the local node publishes, one per adjacency.
    pub fn neighbor_records(&self) -> impl Iterator<Item = NeighborRecord> + '_ {
        self.links.values().flat_map(|link| {
            link.neighbors.values().map(move |n| NeighborRecord {
                neighbor: n.node,
                link_id: link.id,
                neighbor_link_id: n.remote_link_id,
            })
        })
    }

    /// Probe or drop neighbors that have gone quiet.
    pub fn check_liveness(&mut self, now: i64, timeout: i64) -> Vec<LivenessAction> {
        let mut actions = Vec::new();
        for link in self.links.values_mut() {
            let link_id = link.id;
            link.neighbors.retain(|_, n| {
                let silent = now - n.last_heard;
                if silent >= timeout {
                    actions.push(LivenessAction::Dropped {
                        link: link_id,
                        neighbor: n.clone(),
                    });
                    return false;
                }
                if silent >= timeout / 2 && !n.probed {
                    n.probed = true;
                    actions.push(LivenessAction::Probe {
                        link: link_id,
                        neighbor: n.clone(),
                    });
                }
                true
            });
        }
        actions
    }

    /// Earliest time a liveness check has work to do.
    pub fn next_liveness_deadline(&self, timeout: i64) -> Option<i64> {
        self.links
            .values()
            .flat_map(|l| l.neighbors.values())
            .map(|n| {
                if n.probed {
                    n.last_heard + timeout
                } else {
                    n.last_heard + timeout / 2
                }
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trickle() -> Trickle {
        Trickle::new(200, 40_000, 1, 0, &mut StdRng::seed_from_u64(1))
    }

    fn addr(last: u16) -> Ipv6Addr {
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, last)
    }

    #[test]
    fn test_ids_are_unique_and_stable() {
        let mut links = LinkManager::new();
        let a = links.enable("eth0", addr(1), trickle()).unwrap();
        let b = links.enable("eth1", addr(2), trickle()).unwrap();
        assert_eq!((a, b), (1, 2));

        assert!(matches!(
            links.enable("eth0", addr(3), trickle()),
            Err(SyncError::DuplicateLink(_))
        ));

        links.disable("eth0").unwrap();
        let c = links.enable("eth0", addr(1), trickle()).unwrap();
        assert_eq!(c, 3);
        assert_eq!(links.by_name("eth1").unwrap().id(), 2);
        assert!(links.disable("wlan0").is_err());
    }

    #[test]
    fn test_observe_and_records() {
        let mut links = LinkManager::new();
        let l = links.enable("eth0", addr(1), trickle()).unwrap();
        let peer = NodeIdentifier::derive(b"peer");

        assert_eq!(
            links.observe(l, peer, 4, addr(9), 0).unwrap(),
            NeighborEvent::Discovered
        );
        assert_eq!(
            links.observe(l, peer, 4, addr(9), 10).unwrap(),
            NeighborEvent::Refreshed
        );
        assert!(links.observe(99, peer, 4, addr(9), 10).is_err());

        let records: Vec<_> = links.neighbor_records().collect();
        assert_eq!(
            records,
            vec![NeighborRecord {
                neighbor: peer,
                link_id: l,
                neighbor_link_id: 4
            }]
        );
    }

    #[test]
    fn test_probe_then_drop() {
        let mut links = LinkManager::new();
        let l = links.enable("eth0", addr(1), trickle()).unwrap();
        let peer = NodeIdentifier::derive(b"peer");
        links.observe(l, peer, 1, addr(9), 0).unwrap();

        assert!(links.check_liveness(59_999, 120_000).is_empty());
        assert_eq!(links.next_liveness_deadline(120_000), Some(60_000));

        let actions = links.check_liveness(60_000, 120_000);
        assert!(matches!(actions.as_slice(), [LivenessAction::Probe { .. }]));
        assert!(links.check_liveness(61_000, 120_000).is_empty());
        assert_eq!(links.next_liveness_deadline(120_000), Some(120_000));

        let actions = links.check_liveness(120_000, 120_000);
        assert!(matches!(actions.as_slice(), [LivenessAction::Dropped { .. }]));
        assert_eq!(links.get(l).unwrap().neighbor_count(), 0);
        assert_eq!(links.next_liveness_deadline(120_000), None);
    }

    #[test]
    fn test_refresh_clears_probe() {
        let mut links = LinkManager::new();
        let l = links.enable("eth0", addr(1), trickle()).unwrap();
        let peer = NodeIdentifier::derive(b"peer");
        links.observe(l, peer, 1, addr(9), 0).unwrap();
        links.check_liveness(60_000, 120_000);
        links.observe(l, peer, 1, addr(9), 70_000).unwrap();
        assert!(links.check_liveness(125_000, 120_000).is_empty());
    }
}
