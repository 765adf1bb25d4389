//! Proptest generators for property-based testing.

use std::net::Ipv6Addr;

use bytes::Bytes;
use proptest::prelude::*;

use hncp_core::{
    AssignedPrefix, DelegatedPrefix, Digest, ExternalConnection, NeighborRecord, NodeIdentifier,
    Prefix, Record, RouterAddress, Tlv, TlvSet,
};

/// Generate a random NodeIdentifier.
pub fn node_id() -> impl Strategy<Value = NodeIdentifier> {
    any::<[u8; 16]>().prop_map(NodeIdentifier::from_bytes)
}

/// Generate a random Digest.
pub fn digest() -> impl Strategy<Value = Digest> {
    any::<[u8; 16]>().prop_map(Digest::from_bytes)
}

pub fn ipv6() -> impl Strategy<Value = Ipv6Addr> {
    any::<[u8; 16]>().prop_map(Ipv6Addr::from)
}

/// Generate a prefix of any length, host bits cleared.
pub fn prefix() -> impl Strategy<Value = Prefix> {
    (ipv6(), 0u8..=128).prop_filter_map("valid prefix", |(a, l)| Prefix::new(a, l))
}

pub fn router_address() -> impl Strategy<Value = RouterAddress> {
    (ipv6(), any::<u32>()).prop_map(|(address, link_id)| RouterAddress { address, link_id })
}

pub fn assigned_prefix() -> impl Strategy<Value = AssignedPrefix> {
    (any::<u32>(), any::<bool>(), 0u8..=127, prefix()).prop_map(
        |(link_id, authoritative, priority, prefix)| AssignedPrefix {
            link_id,
            authoritative,
            priority,
            prefix,
        },
    )
}

pub fn delegated_prefix() -> impl Strategy<Value = DelegatedPrefix> {
    (any::<u32>(), any::<u32>(), prefix()).prop_map(|(valid, preferred, prefix)| {
        DelegatedPrefix {
            ms_valid_at_origination: valid,
            ms_preferred_at_origination: preferred,
            prefix,
        }
    })
}

pub fn neighbor_record() -> impl Strategy<Value = NeighborRecord> {
    (node_id(), any::<u32>(), any::<u32>()).prop_map(|(neighbor, link_id, neighbor_link_id)| {
        NeighborRecord {
            neighbor,
            link_id,
            neighbor_link_id,
        }
    })
}

/// Generate option blobs of specified max length.
pub fn blob(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

pub fn external_connection() -> impl Strategy<Value = ExternalConnection> {
    (
        proptest::option::of(delegated_prefix()),
        proptest::option::of(blob(64)),
        proptest::option::of(blob(64)),
    )
        .prop_map(|(delegated, dhcpv4, dhcpv6)| ExternalConnection {
            delegated,
            dhcpv4,
            dhcpv6,
        })
}

/// A record of a type no typed view claims, with an opaque payload.
pub fn opaque_tlv() -> impl Strategy<Value = Tlv> {
    (1000u16..=2000, prop::collection::vec(any::<u8>(), 0..=40))
        .prop_map(|(ty, payload)| Tlv::new(ty, &payload).unwrap())
}

/// Any record a node may publish.
pub fn node_tlv() -> impl Strategy<Value = Tlv> {
    prop_oneof![
        router_address().prop_map(|r| r.to_tlv().unwrap()),
        assigned_prefix().prop_map(|r| r.to_tlv().unwrap()),
        neighbor_record().prop_map(|r| r.to_tlv().unwrap()),
        external_connection().prop_map(|r| r.to_tlv().unwrap()),
        opaque_tlv(),
    ]
}

/// A node's published data with up to `max` records.
pub fn node_data(max: usize) -> impl Strategy<Value = TlvSet> {
    prop::collection::vec(node_tlv(), 0..=max).prop_map(|v| v.into_iter().collect())
}
