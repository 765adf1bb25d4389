//! Network hash over the whole store.
//!
//! The network hash is a digest over every node hash, in store order. It is
//! computed on read and cached together with the store generation it was
//! computed at; any mutation of the store makes the cache stale. Node hashes
//! themselves are cached per node (see [`crate::Node::hash`]).

use hncp_core::{Digest, DigestHasher, NodeIdentifier};

use crate::traits::NodeStore;

/// Domain tag mixed into the network hash.
const NETWORK_HASH_DOMAIN: &[u8] = b"hncp-network-v0:";

/// Lazily recomputed network hash.
#[derive(Debug, Clone, Default)]
pub struct HashEngine {
    cache: Option<(u64, Digest)>,
    recomputations: u64,
}

impl HashEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current network hash, recomputing it if the store changed.
    pub fn network_hash<S: NodeStore + ?Sized>(&mut self, store: &mut S) -> Digest {
        let generation = store.generation();
        if let Some((cached_at, digest)) = self.cache {
            if cached_at == generation {
                return digest;
            }
        }

        let digest = combine(store.node_hashes().iter().map(|(_, h)| h));
        self.cache = Some((generation, digest));
        self.recomputations += 1;
        digest
    }

    /// The network hash if it is clean, without computing anything.
    pub fn cached_network_hash<S: NodeStore + ?Sized>(&self, store: &S) -> Option<Digest> {
        match self.cache {
            Some((cached_at, digest)) if cached_at == store.generation() => Some(digest),
            _ => None,
        }
    }

    /// One node's hash.
    pub fn node_hash<S: NodeStore + ?Sized>(
        &self,
        store: &mut S,
        id: &NodeIdentifier,
    ) -> Option<Digest> {
        store.node_hash(id)
    }

    /// Number of times the network hash was actually recomputed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

/// Combine node hashes, already in identifier order, into a network hash.
pub fn combine<'a>(node_hashes: impl IntoIterator<Item = &'a Digest>) -> Digest {
    let mut hasher = DigestHasher::new();
    hasher.update(NETWORK_HASH_DOMAIN);
    for digest in node_hashes {
        hasher.update(digest.as_bytes());
    }
    hasher.finalize()
}
