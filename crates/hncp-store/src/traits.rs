//! NodeStore trait: the abstract interface over the set of known nodes.
//!
//! The synchronization engine is written against this trait only. The
//! in-memory [`crate::MemoryStore`] is the implementation used everywhere.

use hncp_core::{Digest, NodeIdentifier, TlvSet};

use crate::error::Result;
use crate::node::Node;

/// Result of merging a received copy of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// The node was not known before.
    Inserted,
    /// A strictly newer update replaced the stored copy.
    Replaced,
    /// The update was not newer; nothing changed.
    Stale,
}

impl UpsertResult {
    /// Whether the store changed.
    pub fn changed(&self) -> bool {
        !matches!(self, UpsertResult::Stale)
    }
}

/// Ordered collection of known nodes, keyed by identifier.
///
/// # Design Notes
///
/// - **Update number is authoritative**: a copy replaces the stored one only
///   if its update number is strictly greater. Origination time never decides.
/// - **The local node is special**: it is created with the store, changed only
///   through the publishing path, and cannot be removed.
/// - **Generation**: every mutation bumps a counter, so derived values such as
///   the network hash can be cached and invalidated lazily.
/// - **Iteration order** is ascending identifier. The network hash depends on it.
pub trait NodeStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Identifier of the local node.
    fn own_id(&self) -> NodeIdentifier;

    fn get(&self, id: &NodeIdentifier) -> Option<&Node>;

    fn contains(&self, id: &NodeIdentifier) -> bool {
        self.get(id).is_some()
    }

    /// The local node.
    fn self_node(&self) -> &Node;

    /// All nodes in ascending identifier order.
    fn nodes(&self) -> Box<dyn Iterator<Item = &Node> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter bumped on every mutation.
    fn generation(&self) -> u64;

    // ─────────────────────────────────────────────────────────────────────────
    // Hashes
    // ─────────────────────────────────────────────────────────────────────────

    /// The node's hash, computed and cached if dirty. Does not change the
    /// generation.
    fn node_hash(&mut self, id: &NodeIdentifier) -> Option<Digest>;

    /// Compute every dirty node hash and return them in store order.
    fn node_hashes(&mut self) -> Vec<(NodeIdentifier, Digest)>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Merge a received copy of a remote node.
    ///
    /// Returns [`crate::StoreError::OwnNode`] for the local identifier.
    fn upsert(
        &mut self,
        id: NodeIdentifier,
        update_number: u32,
        origination_time: i64,
        tlvs: TlvSet,
    ) -> Result<UpsertResult>;

    /// Remove a remote node.
    fn remove(&mut self, id: &NodeIdentifier) -> Result<Node>;

    /// Republish the local node with new data. Returns the new update number.
    fn publish_self(&mut self, tlvs: TlvSet, now: i64) -> u32;

    /// Move the local update number past `seen` if it is not already, and
    /// refresh origination. Returns the resulting update number.
    fn bump_self_update_number(&mut self, seen: u32, now: i64) -> u32;
}
