//! In-memory implementation of the NodeStore trait.

use std::collections::BTreeMap;

use hncp_core::{Digest, NodeIdentifier, TlvSet};
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::node::Node;
use crate::traits::{NodeStore, UpsertResult};

/// Ordered map of nodes, always holding the local node.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    own_id: NodeIdentifier,
    nodes: BTreeMap<NodeIdentifier, Node>,
    generation: u64,
}

impl MemoryStore {
    /// Create a store holding only the local node, with update number 0 and
    /// no data.
    pub fn new(own_id: NodeIdentifier, now: i64) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(own_id, Node::new(own_id, 0, now, TlvSet::new()));
        Self {
            own_id,
            nodes,
            generation: 0,
        }
    }

    fn own_mut(&mut self) -> &mut Node {
        // The local node is inserted in `new` and `remove` refuses it.
        match self.nodes.get_mut(&self.own_id) {
            Some(node) => node,
            None => unreachable!("local node missing from store"),
        }
    }
}

impl NodeStore for MemoryStore {
    fn own_id(&self) -> NodeIdentifier {
        self.own_id
    }

    fn get(&self, id: &NodeIdentifier) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn self_node(&self) -> &Node {
        match self.nodes.get(&self.own_id) {
            Some(node) => node,
            None => unreachable!("local node missing from store"),
        }
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = &Node> + '_> {
        Box::new(self.nodes.values())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn node_hash(&mut self, id: &NodeIdentifier) -> Option<Digest> {
        self.nodes.get_mut(id).map(Node::hash)
    }

    fn node_hashes(&mut self) -> Vec<(NodeIdentifier, Digest)> {
        self.nodes
            .iter_mut()
            .map(|(id, node)| (*id, node.hash()))
            .collect()
    }

    fn upsert(
        &mut self,
        id: NodeIdentifier,
        update_number: u32,
        origination_time: i64,
        tlvs: TlvSet,
    ) -> Result<UpsertResult> {
        if id == self.own_id {
            return Err(StoreError::OwnNode(id));
        }

        let result = match self.nodes.get_mut(&id) {
            Some(node) if update_number <= node.update_number() => {
                trace!(node = %id, stored = node.update_number(), update_number, "stale update");
                return Ok(UpsertResult::Stale);
            }
            Some(node) => {
                node.replace(update_number, origination_time, tlvs);
                UpsertResult::Replaced
            }
            None => {
                self.nodes
                    .insert(id, Node::new(id, update_number, origination_time, tlvs));
                UpsertResult::Inserted
            }
        };

        self.generation += 1;
        debug!(node = %id, update_number, ?result, "node merged");
        Ok(result)
    }

    fn remove(&mut self, id: &NodeIdentifier) -> Result<Node> {
        if *id == self.own_id {
            return Err(StoreError::OwnNode(*id));
        }
        let node = self.nodes.remove(id).ok_or(StoreError::NotFound(*id))?;
        self.generation += 1;
        Ok(node)
    }

    fn publish_self(&mut self, tlvs: TlvSet, now: i64) -> u32 {
        let node = self.own_mut();
        let update_number = node.update_number().saturating_add(1);
        node.replace(update_number, now, tlvs);
        self.generation += 1;
        update_number
    }

    fn bump_self_update_number(&mut self, seen: u32, now: i64) -> u32 {
        let node = self.own_mut();
        let current = node.update_number();
        if seen < current {
            return current;
        }
        let update_number = seen.saturating_add(1);
        node.set_update_number(update_number, now);
        self.generation += 1;
        update_number
    }
}
