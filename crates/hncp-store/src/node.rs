//! A known router and its published data.

use hncp_core::{
    tlv_type, Digest, DigestHasher, NeighborRecord, NodeIdentifier, NodeRecord, Record, TlvSet,
};

/// Domain tag mixed into every node hash.
const NODE_HASH_DOMAIN: &[u8] = b"hncp-node-data-v0:";

/// Compute the hash of one node's published state.
///
/// The digest covers the identifier, the update number and the canonical
/// encoding of the node's records, so receivers can verify a node-state
/// message against the data it carries.
pub fn node_hash(identifier: &NodeIdentifier, update_number: u32, tlvs: &TlvSet) -> Digest {
    let mut hasher = DigestHasher::new();
    hasher
        .update(NODE_HASH_DOMAIN)
        .update(identifier.as_bytes())
        .update(&update_number.to_be_bytes());
    for tlv in tlvs {
        hasher.update(tlv.as_bytes());
    }
    hasher.finalize()
}

/// One router's copy of the data it publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    identifier: NodeIdentifier,
    update_number: u32,
    origination_time: i64,
    tlvs: TlvSet,
    content_hash: Option<Digest>,
}

impl Node {
    pub fn new(
        identifier: NodeIdentifier,
        update_number: u32,
        origination_time: i64,
        tlvs: TlvSet,
    ) -> Self {
        Self {
            identifier,
            update_number,
            origination_time,
            tlvs,
            content_hash: None,
        }
    }

    pub fn identifier(&self) -> &NodeIdentifier {
        &self.identifier
    }

    pub fn update_number(&self) -> u32 {
        self.update_number
    }

    /// Local clock reading at which this data was originated.
    pub fn origination_time(&self) -> i64 {
        self.origination_time
    }

    /// Milliseconds since origination, as carried in node-state messages.
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.origination_time).max(0)
    }

    pub fn tlvs(&self) -> &TlvSet {
        &self.tlvs
    }

    /// True when the cached hash has been invalidated.
    pub fn is_dirty(&self) -> bool {
        self.content_hash.is_none()
    }

    /// The cached hash, if clean.
    pub fn cached_hash(&self) -> Option<Digest> {
        self.content_hash
    }

    /// The node hash, computed on first read after a change.
    pub fn hash(&mut self) -> Digest {
        match self.content_hash {
            Some(digest) => digest,
            None => {
                let digest = node_hash(&self.identifier, self.update_number, &self.tlvs);
                self.content_hash = Some(digest);
                digest
            }
        }
    }

    /// Replace the published data and mark the hash dirty.
    pub(crate) fn replace(&mut self, update_number: u32, origination_time: i64, tlvs: TlvSet) {
        self.update_number = update_number;
        self.origination_time = origination_time;
        self.tlvs = tlvs;
        self.content_hash = None;
    }

    pub(crate) fn set_update_number(&mut self, update_number: u32, origination_time: i64) {
        self.update_number = update_number;
        self.origination_time = origination_time;
        self.content_hash = None;
    }

    /// The adjacencies this node publishes. Malformed records are skipped.
    pub fn neighbors(&self) -> impl Iterator<Item = NeighborRecord> + '_ {
        self.tlvs
            .of_type(tlv_type::NODE_DATA_NEIGHBOR)
            .filter_map(|tlv| NeighborRecord::from_tlv(tlv.view()).ok())
    }

    /// Typed view over every record that decodes.
    pub fn records(&self) -> impl Iterator<Item = NodeRecord> + '_ {
        self.tlvs
            .iter()
            .filter_map(|tlv| NodeRecord::decode(tlv.view()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hncp_core::Tlv;

    fn sample_tlvs() -> TlvSet {
        [Tlv::new(44, &[0u8; 20]).unwrap(), Tlv::new(9000, b"x").unwrap()]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_hash_is_lazy_and_cached() {
        let id = NodeIdentifier::derive(b"r1");
        let mut node = Node::new(id, 1, 0, sample_tlvs());
        assert!(node.is_dirty());

        let h = node.hash();
        assert!(!node.is_dirty());
        assert_eq!(node.cached_hash(), Some(h));
        assert_eq!(h, node_hash(&id, 1, &sample_tlvs()));
    }

    #[test]
    fn test_replace_marks_dirty() {
        let id = NodeIdentifier::derive(b"r1");
        let mut node = Node::new(id, 1, 0, sample_tlvs());
        let before = node.hash();
        node.replace(2, 10, TlvSet::new());
        assert!(node.is_dirty());
        assert_ne!(node.hash(), before);
    }

    #[test]
    fn test_hash_covers_update_number() {
        let id = NodeIdentifier::derive(b"r1");
        assert_ne!(
            node_hash(&id, 1, &sample_tlvs()),
            node_hash(&id, 2, &sample_tlvs())
        );
    }

    #[test]
    fn test_neighbors_skip_malformed() {
        let good = NeighborRecord {
            neighbor: NodeIdentifier::derive(b"peer"),
            link_id: 1,
            neighbor_link_id: 2,
        };
        let tlvs: TlvSet = [
            good.to_tlv().unwrap(),
            Tlv::new(tlv_type::NODE_DATA_NEIGHBOR, b"short").unwrap(),
        ]
        .into_iter()
        .collect();
        let node = Node::new(NodeIdentifier::derive(b"r1"), 1, 0, tlvs);
        assert_eq!(node.neighbors().collect::<Vec<_>>(), vec![good]);
    }

    #[test]
    fn test_age_never_negative() {
        let node = Node::new(NodeIdentifier::derive(b"r1"), 1, 500, TlvSet::new());
        assert_eq!(node.age(1500), 1000);
        assert_eq!(node.age(100), 0);
    }
}
