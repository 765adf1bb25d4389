//! Protocol message records and datagram assembly.
//!
//! A datagram is a canonical sequence of TLVs. Every datagram we send starts
//! with a [`LinkId`] naming the sender's node and interface; the type number
//! of that record is the lowest in use, so canonical order puts it first.

use hncp_core::{
    append_tlv, read_u32, tlv_type, tlvs, verify_message, Digest, EncodeError, NodeIdentifier,
    Record, Tlv, TlvError, TlvSet, DIGEST_LEN, NODE_ID_LEN, NODE_STATE_HEADER_LEN,
};

use crate::error::{Result, SyncError};

/// Current protocol version, reported in snapshots.
pub const PROTOCOL_VERSION: u8 = 1;

fn invalid(ty: u16, reason: &'static str) -> TlvError {
    TlvError::InvalidPayload { ty, reason }
}

fn node_id_at(p: &[u8], at: usize) -> NodeIdentifier {
    let mut id = [0u8; NODE_ID_LEN];
    id.copy_from_slice(&p[at..at + NODE_ID_LEN]);
    NodeIdentifier(id)
}

fn digest_at(p: &[u8], at: usize) -> Digest {
    let mut d = [0u8; DIGEST_LEN];
    d.copy_from_slice(&p[at..at + DIGEST_LEN]);
    Digest(d)
}

/// The sender of a datagram: its node and the interface it sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkId {
    pub node: NodeIdentifier,
    pub link_id: u32,
}

impl Record for LinkId {
    const TYPE: u16 = tlv_type::LINK_ID;

    fn encode_payload(&self, out: &mut Vec<u8>) -> std::result::Result<(), TlvError> {
        out.extend_from_slice(self.node.as_bytes());
        out.extend_from_slice(&self.link_id.to_be_bytes());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> std::result::Result<Self, TlvError> {
        if p.len() != NODE_ID_LEN + 4 {
            return Err(invalid(Self::TYPE, "link id must be 20 bytes"));
        }
        Ok(Self {
            node: node_id_at(p, 0),
            link_id: read_u32(p, NODE_ID_LEN),
        })
    }
}

/// Request for the full network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReqNetHash;

impl Record for ReqNetHash {
    const TYPE: u16 = tlv_type::REQ_NET_HASH;

    fn encode_payload(&self, _out: &mut Vec<u8>) -> std::result::Result<(), TlvError> {
        Ok(())
    }

    fn decode_payload(_p: &[u8]) -> std::result::Result<Self, TlvError> {
        Ok(Self)
    }
}

/// Request for one node's full state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReqNodeData(pub NodeIdentifier);

impl Record for ReqNodeData {
    const TYPE: u16 = tlv_type::REQ_NODE_DATA;

    fn encode_payload(&self, out: &mut Vec<u8>) -> std::result::Result<(), TlvError> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> std::result::Result<Self, TlvError> {
        if p.len() != NODE_ID_LEN {
            return Err(invalid(Self::TYPE, "node id must be 16 bytes"));
        }
        Ok(Self(node_id_at(p, 0)))
    }
}

/// The sender's network hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHash(pub Digest);

impl Record for NetworkHash {
    const TYPE: u16 = tlv_type::NETWORK_HASH;

    fn encode_payload(&self, out: &mut Vec<u8>) -> std::result::Result<(), TlvError> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> std::result::Result<Self, TlvError> {
        if p.len() != DIGEST_LEN {
            return Err(invalid(Self::TYPE, "network hash must be 16 bytes"));
        }
        Ok(Self(digest_at(p, 0)))
    }
}

/// One node's state: a summary, or a summary plus the full data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub node: NodeIdentifier,
    pub update_number: u32,
    pub ms_since_origination: u32,
    pub node_hash: Digest,
    pub data: Option<TlvSet>,
}

impl Record for NodeState {
    const TYPE: u16 = tlv_type::NODE_STATE;

    fn encode_payload(&self, out: &mut Vec<u8>) -> std::result::Result<(), TlvError> {
        out.extend_from_slice(self.node.as_bytes());
        out.extend_from_slice(&self.update_number.to_be_bytes());
        out.extend_from_slice(&self.ms_since_origination.to_be_bytes());
        out.extend_from_slice(self.node_hash.as_bytes());
        if let Some(data) = &self.data {
            append_tlv(out, tlv_type::NODE_DATA, &data.to_bytes())?;
        }
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> std::result::Result<Self, TlvError> {
        if p.len() < NODE_STATE_HEADER_LEN {
            return Err(invalid(Self::TYPE, "node state header truncated"));
        }
        let nested = TlvSet::from_canonical(&p[NODE_STATE_HEADER_LEN..])?;
        let data = match nested.of_type(tlv_type::NODE_DATA).next() {
            Some(container) => Some(TlvSet::from_canonical(container.payload())?),
            None => None,
        };
        Ok(Self {
            node: node_id_at(p, 0),
            update_number: read_u32(p, NODE_ID_LEN),
            ms_since_origination: read_u32(p, NODE_ID_LEN + 4),
            node_hash: digest_at(p, NODE_ID_LEN + 8),
            data,
        })
    }
}

/// A decoded datagram.
///
/// Records that fail to decode are dropped and reported in `errors`; the
/// rest of the message is still usable.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub link_id: Option<LinkId>,
    pub network_hash: Option<Digest>,
    pub req_net_hash: bool,
    pub req_node_data: Vec<NodeIdentifier>,
    pub node_states: Vec<NodeState>,
    /// Records that were dropped.
    pub errors: Vec<TlvError>,
    /// Set when siblings anywhere in the datagram are out of order.
    pub ordering_violation: Option<TlvError>,
}

impl Message {
    /// Decode a datagram, keeping every record that parses.
    ///
    /// Fails only if no record at all could be read.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut msg = Message::default();
        let mut seen = 0usize;

        for item in tlvs(buf) {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    msg.errors.push(e);
                    continue;
                }
            };
            seen += 1;

            let outcome = match record.ty() {
                tlv_type::LINK_ID => LinkId::from_tlv(record).map(|l| {
                    msg.link_id.get_or_insert(l);
                }),
                tlv_type::REQ_NET_HASH => {
                    msg.req_net_hash = true;
                    Ok(())
                }
                tlv_type::REQ_NODE_DATA => {
                    ReqNodeData::from_tlv(record).map(|r| msg.req_node_data.push(r.0))
                }
                tlv_type::NETWORK_HASH => NetworkHash::from_tlv(record).map(|h| {
                    msg.network_hash = Some(h.0);
                }),
                tlv_type::NODE_STATE => {
                    NodeState::from_tlv(record).map(|s| msg.node_states.push(s))
                }
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                msg.errors.push(e);
            }
        }

        if seen == 0 {
            return Err(match msg.errors.into_iter().next() {
                Some(e) => SyncError::Decode(e),
                None => SyncError::EmptyMessage,
            });
        }

        if let Err(e @ TlvError::OrderingViolation { .. }) = verify_message(buf) {
            msg.ordering_violation = Some(e);
        }
        Ok(msg)
    }

    /// Node states that carry only a summary.
    pub fn summaries(&self) -> impl Iterator<Item = &NodeState> + '_ {
        self.node_states.iter().filter(|s| s.data.is_none())
    }
}

/// Bounded builder for one outbound datagram.
///
/// Records are kept sorted as they are added, so the result is canonical.
/// Adding a record that would push the message past its limit fails and
/// leaves the builder unchanged; dropping the builder releases everything.
#[derive(Debug)]
pub struct MessageBuilder {
    records: TlvSet,
    len: usize,
    max_len: usize,
}

impl MessageBuilder {
    /// Start a message from the given sender.
    pub fn new(sender: LinkId, max_len: usize) -> std::result::Result<Self, EncodeError> {
        let mut builder = Self {
            records: TlvSet::new(),
            len: 0,
            max_len,
        };
        builder.push(&sender)?;
        Ok(builder)
    }

    /// Add a typed record.
    pub fn push<R: Record>(&mut self, record: &R) -> std::result::Result<(), EncodeError> {
        self.push_tlv(record.to_tlv()?)
    }

    /// Add an encoded record.
    pub fn push_tlv(&mut self, tlv: Tlv) -> std::result::Result<(), EncodeError> {
        let len = self.len + tlv.as_bytes().len();
        if len > self.max_len {
            return Err(EncodeError::MessageTooLarge {
                len,
                max: self.max_len,
            });
        }
        if self.records.insert(tlv) {
            self.len = len;
        }
        Ok(())
    }

    /// Encoded size so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing but the sender record has been added.
    pub fn is_empty(&self) -> bool {
        self.records.len() <= 1
    }

    /// Produce the datagram.
    pub fn finish(self) -> std::result::Result<Vec<u8>, EncodeError> {
        self.records.encode_bounded(self.max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hncp_core::{RouterAddress, TlvRef};

    fn sender() -> LinkId {
        LinkId {
            node: NodeIdentifier::derive(b"sender"),
            link_id: 3,
        }
    }

    fn node_state(with_data: bool) -> NodeState {
        let data: TlvSet = [RouterAddress {
            address: "2001:db8::1".parse().unwrap(),
            link_id: 1,
        }
        .to_tlv()
        .unwrap()]
        .into_iter()
        .collect();
        NodeState {
            node: NodeIdentifier::derive(b"n"),
            update_number: 7,
            ms_since_origination: 1500,
            node_hash: Digest::hash(b"h"),
            data: with_data.then_some(data),
        }
    }

    #[test]
    fn test_link_id_sorts_first() {
        let mut b = MessageBuilder::new(sender(), 1280).unwrap();
        b.push(&NetworkHash(Digest::hash(b"x"))).unwrap();
        b.push(&ReqNetHash).unwrap();
        let bytes = b.finish().unwrap();

        let first: TlvRef<'_> = tlvs(&bytes).next().unwrap().unwrap();
        assert_eq!(first.ty(), tlv_type::LINK_ID);
        assert!(verify_message(&bytes).is_ok());
    }

    #[test]
    fn test_decode_full_message() {
        let mut b = MessageBuilder::new(sender(), 1280).unwrap();
        b.push(&NetworkHash(Digest::hash(b"x"))).unwrap();
        b.push(&ReqNodeData(NodeIdentifier::derive(b"q"))).unwrap();
        b.push(&node_state(true)).unwrap();
        b.push(&node_state(false)).unwrap();
        let bytes = b.finish().unwrap();

        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.link_id, Some(sender()));
        assert_eq!(msg.network_hash, Some(Digest::hash(b"x")));
        assert_eq!(msg.req_node_data, vec![NodeIdentifier::derive(b"q")]);
        assert_eq!(msg.node_states.len(), 2);
        assert_eq!(msg.summaries().count(), 1);
        assert!(msg.errors.is_empty());
        assert!(msg.ordering_violation.is_none());
    }

    #[test]
    fn test_node_state_header_length() {
        let tlv = node_state(false).to_tlv().unwrap();
        assert_eq!(tlv.len(), NODE_STATE_HEADER_LEN);
        let decoded = NodeState::from_tlv(tlv.view()).unwrap();
        assert_eq!(decoded, node_state(false));
    }

    #[test]
    fn test_bad_record_dropped_siblings_kept() {
        let mut bytes = Tlv::new(tlv_type::LINK_ID, &[0u8; 20]).unwrap().as_bytes().to_vec();
        bytes.extend_from_slice(Tlv::new(tlv_type::REQ_NET_HASH, &[]).unwrap().as_bytes());
        bytes.extend_from_slice(Tlv::new(tlv_type::REQ_NODE_DATA, &[1, 2]).unwrap().as_bytes());
        bytes.extend_from_slice(&[0, 4, 0, 99]);

        let msg = Message::decode(&bytes).unwrap();
        assert!(msg.link_id.is_some());
        assert!(msg.req_net_hash);
        assert!(msg.req_node_data.is_empty());
        assert_eq!(msg.errors.len(), 2);
    }

    #[test]
    fn test_unparseable_message_rejected() {
        assert!(matches!(
            Message::decode(&[0, 1]),
            Err(SyncError::Decode(TlvError::TruncatedHeader { .. }))
        ));
        assert!(matches!(Message::decode(&[]), Err(SyncError::EmptyMessage)));
    }

    #[test]
    fn test_ordering_violation_reported() {
        let mut bytes = Tlv::new(tlv_type::NETWORK_HASH, &[0u8; 16]).unwrap().as_bytes().to_vec();
        bytes.extend_from_slice(Tlv::new(tlv_type::LINK_ID, &[0u8; 20]).unwrap().as_bytes());

        let msg = Message::decode(&bytes).unwrap();
        assert!(msg.link_id.is_some());
        assert!(matches!(
            msg.ordering_violation,
            Some(TlvError::OrderingViolation { offset: 20 })
        ));
    }

    #[test]
    fn test_builder_limit_leaves_builder_usable() {
        let mut b = MessageBuilder::new(sender(), 64).unwrap();
        assert_eq!(b.len(), 24);
        assert!(b.is_empty());
        assert!(matches!(
            b.push(&node_state(true)),
            Err(EncodeError::MessageTooLarge { max: 64, .. })
        ));
        assert_eq!(b.len(), 24);
        b.push(&NetworkHash(Digest::hash(b"x"))).unwrap();
        assert_eq!(b.finish().unwrap().len(), 44);
    }
}
