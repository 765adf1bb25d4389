//! Typed TLV records published inside node data.
//!
//! Each record type implements [`Record`], which maps between the typed value
//! and its TLV payload. [`NodeRecord`] dispatches over every type a node can
//! publish.

use bytes::Bytes;
use std::net::Ipv6Addr;

use crate::canonical::TlvSet;
use crate::error::TlvError;
use crate::prefix::Prefix;
use crate::tlv::{append_tlv, Tlv, TlvRef};
use crate::types::{NodeIdentifier, NODE_ID_LEN};
use crate::crypto::DIGEST_LEN;

/// Record type numbers.
pub mod tlv_type {
    pub const LINK_ID: u16 = 1;
    pub const REQ_NET_HASH: u16 = 2;
    pub const REQ_NODE_DATA: u16 = 3;
    pub const NETWORK_HASH: u16 = 4;
    pub const NODE_STATE: u16 = 5;
    pub const NODE_DATA: u16 = 6;
    pub const NODE_DATA_NEIGHBOR: u16 = 8;
    pub const EXTERNAL_CONNECTION: u16 = 41;
    pub const DELEGATED_PREFIX: u16 = 42;
    pub const ASSIGNED_PREFIX: u16 = 43;
    pub const ROUTER_ADDRESS: u16 = 44;
    pub const DHCP_OPTIONS: u16 = 45;
    pub const DHCPV6_OPTIONS: u16 = 46;
}

/// Fixed header of a node-state record: id, update number, age, node hash.
pub const NODE_STATE_HEADER_LEN: usize = NODE_ID_LEN + 4 + 4 + DIGEST_LEN;

/// For container types, the length of the fixed header before nested records.
pub fn container_header_len(ty: u16) -> Option<usize> {
    match ty {
        tlv_type::NODE_STATE => Some(NODE_STATE_HEADER_LEN),
        tlv_type::NODE_DATA | tlv_type::EXTERNAL_CONNECTION => Some(0),
        _ => None,
    }
}

/// A typed record with a fixed TLV type.
pub trait Record: Sized {
    const TYPE: u16;

    /// Append the payload encoding.
    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError>;

    /// Parse a payload of this record's type.
    fn decode_payload(payload: &[u8]) -> Result<Self, TlvError>;

    /// Encode as a TLV. Fails only if the payload exceeds the length field.
    fn to_tlv(&self) -> Result<Tlv, TlvError> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)?;
        Tlv::new(Self::TYPE, &payload)
    }

    fn from_tlv(tlv: TlvRef<'_>) -> Result<Self, TlvError> {
        if tlv.ty() != Self::TYPE {
            return Err(TlvError::UnexpectedType {
                expected: Self::TYPE,
                got: tlv.ty(),
            });
        }
        Self::decode_payload(tlv.payload())
    }
}

/// Read a big-endian u32 at `at`. The caller has checked the bounds.
pub fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_node_id(data: &[u8], at: usize) -> NodeIdentifier {
    let mut id = [0u8; NODE_ID_LEN];
    id.copy_from_slice(&data[at..at + NODE_ID_LEN]);
    NodeIdentifier(id)
}

fn invalid(ty: u16, reason: &'static str) -> TlvError {
    TlvError::InvalidPayload { ty, reason }
}

/// A router's address on one of its links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterAddress {
    pub address: Ipv6Addr,
    pub link_id: u32,
}

impl Record for RouterAddress {
    const TYPE: u16 = tlv_type::ROUTER_ADDRESS;

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        out.extend_from_slice(&self.address.octets());
        out.extend_from_slice(&self.link_id.to_be_bytes());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> Result<Self, TlvError> {
        if p.len() != 20 {
            return Err(invalid(Self::TYPE, "router address must be 20 bytes"));
        }
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&p[..16]);
        Ok(Self {
            address: Ipv6Addr::from(octets),
            link_id: read_u32(p, 16),
        })
    }
}

/// A prefix assigned to one of the publishing node's links.
///
/// `priority` occupies seven bits on the wire; larger values are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedPrefix {
    pub link_id: u32,
    pub authoritative: bool,
    pub priority: u8,
    pub prefix: Prefix,
}

impl AssignedPrefix {
    pub const FLAG_AUTHORITATIVE: u8 = 0x01;

    pub fn flags(&self) -> u8 {
        ((self.priority & 0x7f) << 1) | u8::from(self.authoritative)
    }
}

impl Record for AssignedPrefix {
    const TYPE: u16 = tlv_type::ASSIGNED_PREFIX;

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        out.extend_from_slice(&self.link_id.to_be_bytes());
        out.push(self.flags());
        out.push(self.prefix.len());
        out.extend_from_slice(&self.prefix.packed());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> Result<Self, TlvError> {
        if p.len() < 6 {
            return Err(invalid(Self::TYPE, "assigned prefix header truncated"));
        }
        let flags = p[4];
        let prefix = Prefix::from_packed(p[5], &p[6..])
            .ok_or_else(|| invalid(Self::TYPE, "bad prefix length or data"))?;
        Ok(Self {
            link_id: read_u32(p, 0),
            authoritative: flags & Self::FLAG_AUTHORITATIVE != 0,
            priority: flags >> 1,
            prefix,
        })
    }
}

/// A prefix delegated to the network through an external connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegatedPrefix {
    pub ms_valid_at_origination: u32,
    pub ms_preferred_at_origination: u32,
    pub prefix: Prefix,
}

impl Record for DelegatedPrefix {
    const TYPE: u16 = tlv_type::DELEGATED_PREFIX;

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        out.extend_from_slice(&self.ms_valid_at_origination.to_be_bytes());
        out.extend_from_slice(&self.ms_preferred_at_origination.to_be_bytes());
        out.push(self.prefix.len());
        out.extend_from_slice(&self.prefix.packed());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> Result<Self, TlvError> {
        if p.len() < 9 {
            return Err(invalid(Self::TYPE, "delegated prefix header truncated"));
        }
        let prefix = Prefix::from_packed(p[8], &p[9..])
            .ok_or_else(|| invalid(Self::TYPE, "bad prefix length or data"))?;
        Ok(Self {
            ms_valid_at_origination: read_u32(p, 0),
            ms_preferred_at_origination: read_u32(p, 4),
            prefix,
        })
    }
}

/// One direction of an adjacency: "I hear `neighbor` on my `link_id`, where
/// it uses `neighbor_link_id`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeighborRecord {
    pub neighbor: NodeIdentifier,
    pub link_id: u32,
    pub neighbor_link_id: u32,
}

impl NeighborRecord {
    /// The record the neighbor would publish about us on the same adjacency.
    pub fn reverse(&self, own: NodeIdentifier) -> Self {
        Self {
            neighbor: own,
            link_id: self.neighbor_link_id,
            neighbor_link_id: self.link_id,
        }
    }
}

impl Record for NeighborRecord {
    const TYPE: u16 = tlv_type::NODE_DATA_NEIGHBOR;

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        out.extend_from_slice(&self.neighbor.0);
        out.extend_from_slice(&self.link_id.to_be_bytes());
        out.extend_from_slice(&self.neighbor_link_id.to_be_bytes());
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> Result<Self, TlvError> {
        if p.len() != NODE_ID_LEN + 8 {
            return Err(invalid(Self::TYPE, "neighbor record must be 24 bytes"));
        }
        Ok(Self {
            neighbor: read_node_id(p, 0),
            link_id: read_u32(p, NODE_ID_LEN),
            neighbor_link_id: read_u32(p, NODE_ID_LEN + 4),
        })
    }
}

/// An uplink: at most one delegated prefix plus at most one opaque blob of
/// each DHCP option kind. A repeated nested type makes the record invalid.
///
/// The blobs are carried untouched; interpreting them belongs to whoever
/// handles address delegation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalConnection {
    pub delegated: Option<DelegatedPrefix>,
    pub dhcpv4: Option<Bytes>,
    pub dhcpv6: Option<Bytes>,
}

impl Record for ExternalConnection {
    const TYPE: u16 = tlv_type::EXTERNAL_CONNECTION;

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        // Nested records go out in type order, which is their canonical order.
        if let Some(dp) = &self.delegated {
            let mut payload = Vec::new();
            dp.encode_payload(&mut payload)?;
            append_tlv(out, tlv_type::DELEGATED_PREFIX, &payload)?;
        }
        if let Some(blob) = &self.dhcpv4 {
            append_tlv(out, tlv_type::DHCP_OPTIONS, blob)?;
        }
        if let Some(blob) = &self.dhcpv6 {
            append_tlv(out, tlv_type::DHCPV6_OPTIONS, blob)?;
        }
        Ok(())
    }

    fn decode_payload(p: &[u8]) -> Result<Self, TlvError> {
        let children = TlvSet::from_canonical(p)?;
        let mut conn = Self::default();
        for child in &children {
            match child.ty() {
                tlv_type::DELEGATED_PREFIX => set_once(
                    &mut conn.delegated,
                    DelegatedPrefix::from_tlv(child.view())?,
                    "more than one delegated prefix",
                )?,
                tlv_type::DHCP_OPTIONS => set_once(
                    &mut conn.dhcpv4,
                    Bytes::copy_from_slice(child.payload()),
                    "more than one DHCPv4 options record",
                )?,
                tlv_type::DHCPV6_OPTIONS => set_once(
                    &mut conn.dhcpv6,
                    Bytes::copy_from_slice(child.payload()),
                    "more than one DHCPv6 options record",
                )?,
                _ => {}
            }
        }
        Ok(conn)
    }
}

/// Each nested type of an external connection may appear at most once.
fn set_once<T>(slot: &mut Option<T>, value: T, reason: &'static str) -> Result<(), TlvError> {
    if slot.is_some() {
        return Err(invalid(ExternalConnection::TYPE, reason));
    }
    *slot = Some(value);
    Ok(())
}

/// Any record a node may publish in its node data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRecord {
    RouterAddress(RouterAddress),
    AssignedPrefix(AssignedPrefix),
    Neighbor(NeighborRecord),
    ExternalConnection(ExternalConnection),
    /// A type this implementation does not interpret; kept and flooded as is.
    Unknown(u16),
}

impl NodeRecord {
    pub fn decode(tlv: TlvRef<'_>) -> Result<Self, TlvError> {
        Ok(match tlv.ty() {
            tlv_type::ROUTER_ADDRESS => Self::RouterAddress(RouterAddress::from_tlv(tlv)?),
            tlv_type::ASSIGNED_PREFIX => Self::AssignedPrefix(AssignedPrefix::from_tlv(tlv)?),
            tlv_type::NODE_DATA_NEIGHBOR => Self::Neighbor(NeighborRecord::from_tlv(tlv)?),
            tlv_type::EXTERNAL_CONNECTION => {
                Self::ExternalConnection(ExternalConnection::from_tlv(tlv)?)
            }
            other => Self::Unknown(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_assigned_prefix_flags() {
        let ap = AssignedPrefix {
            link_id: 3,
            authoritative: true,
            priority: 2,
            prefix: prefix("2001:db8:1::/64"),
        };
        assert_eq!(ap.flags(), 0b0000_0101);

        let tlv = ap.to_tlv().unwrap();
        assert_eq!(tlv.ty(), tlv_type::ASSIGNED_PREFIX);
        assert_eq!(tlv.len(), 4 + 1 + 1 + 8);
        assert_eq!(AssignedPrefix::from_tlv(tlv.view()).unwrap(), ap);
    }

    #[test]
    fn test_priority_truncated_to_seven_bits() {
        let ap = AssignedPrefix {
            link_id: 1,
            authoritative: false,
            priority: 0xff,
            prefix: prefix("2001:db8::/48"),
        };
        let decoded = AssignedPrefix::from_tlv(ap.to_tlv().unwrap().view()).unwrap();
        assert_eq!(decoded.priority, 127);
        assert!(!decoded.authoritative);
    }

    #[test]
    fn test_router_address_length_checked() {
        let ra = RouterAddress {
            address: "fe80::1".parse().unwrap(),
            link_id: 7,
        };
        let tlv = ra.to_tlv().unwrap();
        assert_eq!(tlv.len(), 20);
        assert_eq!(RouterAddress::from_tlv(tlv.view()).unwrap(), ra);

        let short = Tlv::new(tlv_type::ROUTER_ADDRESS, &[0u8; 12]).unwrap();
        assert!(RouterAddress::from_tlv(short.view()).is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let tlv = Tlv::new(tlv_type::ASSIGNED_PREFIX, &[0u8; 6]).unwrap();
        assert_eq!(
            RouterAddress::from_tlv(tlv.view()),
            Err(TlvError::UnexpectedType {
                expected: tlv_type::ROUTER_ADDRESS,
                got: tlv_type::ASSIGNED_PREFIX
            })
        );
    }

    #[test]
    fn test_neighbor_reverse() {
        let a = NodeIdentifier::derive(b"a");
        let b = NodeIdentifier::derive(b"b");
        let on_a = NeighborRecord {
            neighbor: b,
            link_id: 1,
            neighbor_link_id: 4,
        };
        let on_b = on_a.reverse(a);
        assert_eq!(on_b.neighbor, a);
        assert_eq!(on_b.link_id, 4);
        assert_eq!(on_b.neighbor_link_id, 1);
        assert_eq!(NeighborRecord::from_tlv(on_b.to_tlv().unwrap().view()).unwrap(), on_b);
    }

    #[test]
    fn test_external_connection_nested() {
        let conn = ExternalConnection {
            delegated: Some(DelegatedPrefix {
                ms_valid_at_origination: 7_200_000,
                ms_preferred_at_origination: 3_600_000,
                prefix: prefix("2001:db8::/56"),
            }),
            dhcpv4: None,
            dhcpv6: Some(Bytes::from_static(&[0, 23, 0, 16])),
        };
        let tlv = conn.to_tlv().unwrap();
        assert_eq!(ExternalConnection::from_tlv(tlv.view()).unwrap(), conn);
    }

    #[test]
    fn test_external_connection_two_delegated_rejected() {
        let dp = |p: &str| DelegatedPrefix {
            ms_valid_at_origination: 1,
            ms_preferred_at_origination: 1,
            prefix: prefix(p),
        };
        let set: TlvSet = [
            dp("2001:db8::/56").to_tlv().unwrap(),
            dp("2001:db8:1::/56").to_tlv().unwrap(),
        ]
        .into_iter()
        .collect();
        let tlv = Tlv::container(tlv_type::EXTERNAL_CONNECTION, &[], &set).unwrap();
        assert!(ExternalConnection::from_tlv(tlv.view()).is_err());
    }

    #[test]
    fn test_external_connection_repeated_dhcp_rejected() {
        for ty in [tlv_type::DHCP_OPTIONS, tlv_type::DHCPV6_OPTIONS] {
            let set: TlvSet = [Tlv::new(ty, b"first").unwrap(), Tlv::new(ty, b"second").unwrap()]
                .into_iter()
                .collect();
            let tlv = Tlv::container(tlv_type::EXTERNAL_CONNECTION, &[], &set).unwrap();
            assert!(matches!(
                ExternalConnection::from_tlv(tlv.view()),
                Err(TlvError::InvalidPayload { ty: tlv_type::EXTERNAL_CONNECTION, .. })
            ));
        }

        // One of each kind is fine.
        let set: TlvSet = [
            Tlv::new(tlv_type::DHCP_OPTIONS, b"v4").unwrap(),
            Tlv::new(tlv_type::DHCPV6_OPTIONS, b"v6").unwrap(),
        ]
        .into_iter()
        .collect();
        let tlv = Tlv::container(tlv_type::EXTERNAL_CONNECTION, &[], &set).unwrap();
        let conn = ExternalConnection::from_tlv(tlv.view()).unwrap();
        assert_eq!(conn.dhcpv4.as_deref(), Some(&b"v4"[..]));
        assert_eq!(conn.dhcpv6.as_deref(), Some(&b"v6"[..]));
    }

    #[test]
    fn test_oversized_blob_rejected() {
        let conn = ExternalConnection {
            delegated: None,
            dhcpv4: Some(Bytes::from(vec![0u8; 70_000])),
            dhcpv6: None,
        };
        assert!(matches!(conn.to_tlv(), Err(TlvError::PayloadTooLarge(_))));
    }

    #[test]
    fn test_node_record_dispatch() {
        let ra = RouterAddress {
            address: "2001:db8::1".parse().unwrap(),
            link_id: 1,
        };
        let unknown = Tlv::new(9000, b"opaque").unwrap();
        assert_eq!(
            NodeRecord::decode(ra.to_tlv().unwrap().view()).unwrap(),
            NodeRecord::RouterAddress(ra)
        );
        assert_eq!(NodeRecord::decode(unknown.view()).unwrap(), NodeRecord::Unknown(9000));
    }

    #[test]
    fn test_container_header_lengths() {
        assert_eq!(container_header_len(tlv_type::NODE_STATE), Some(40));
        assert_eq!(container_header_len(tlv_type::NODE_DATA), Some(0));
        assert_eq!(container_header_len(tlv_type::ROUTER_ADDRESS), None);
    }
}
