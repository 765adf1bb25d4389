//! Golden test vectors for deterministic verification.
//!
//! Encoding vectors pin the exact wire bytes of each record type. Hash
//! vectors pin identifier derivation, node hashing and the network hash.

use std::net::Ipv6Addr;

use bytes::Bytes;

use hncp_core::{
    AssignedPrefix, DelegatedPrefix, ExternalConnection, NeighborRecord, NodeIdentifier, Prefix,
    Record, RouterAddress, Tlv, TlvSet,
};
use hncp_store::hash::combine;
use hncp_store::node_hash;
use hncp_sync::{LinkId, ReqNetHash};

/// A record and the exact bytes it must encode to.
#[derive(Debug, Clone)]
pub struct EncodingVector {
    pub name: &'static str,
    pub build: fn() -> Tlv,
    /// Expected padded encoding (hex).
    pub expected_hex: &'static str,
}

/// A hash computation and its expected result.
#[derive(Debug, Clone)]
pub struct HashVector {
    pub name: &'static str,
    pub compute: fn() -> String,
    /// Expected digest (hex).
    pub expected_hex: &'static str,
}

fn prefix(s: &str) -> Prefix {
    s.parse().unwrap()
}

/// Get all encoding vectors.
pub fn encoding_vectors() -> Vec<EncodingVector> {
    vec![
        EncodingVector {
            name: "request network state",
            build: || ReqNetHash.to_tlv().unwrap(),
            expected_hex: "00020000",
        },
        EncodingVector {
            name: "link id",
            build: || {
                LinkId {
                    node: NodeIdentifier::from_bytes([0x22; 16]),
                    link_id: 3,
                }
                .to_tlv()
                .unwrap()
            },
            expected_hex: "0001001422222222222222222222222222222222\
                           00000003",
        },
        EncodingVector {
            name: "neighbor",
            build: || {
                NeighborRecord {
                    neighbor: NodeIdentifier::from_bytes([0x11; 16]),
                    link_id: 1,
                    neighbor_link_id: 2,
                }
                .to_tlv()
                .unwrap()
            },
            expected_hex: "0008001811111111111111111111111111111111\
                           0000000100000002",
        },
        EncodingVector {
            name: "assigned /64, authoritative, priority 2",
            build: || {
                AssignedPrefix {
                    link_id: 1,
                    authoritative: true,
                    priority: 2,
                    prefix: prefix("2001:db8:1::/64"),
                }
                .to_tlv()
                .unwrap()
            },
            // 14 byte payload, 2 bytes of padding.
            expected_hex: "002b000e00000001054020010db8000100000000",
        },
        EncodingVector {
            name: "router address",
            build: || {
                RouterAddress {
                    address: "fe80::1".parse::<Ipv6Addr>().unwrap(),
                    link_id: 7,
                }
                .to_tlv()
                .unwrap()
            },
            expected_hex: "002c0014fe80000000000000000000000000000100000007",
        },
        EncodingVector {
            name: "delegated /32",
            build: || {
                DelegatedPrefix {
                    ms_valid_at_origination: 3_600_000,
                    ms_preferred_at_origination: 1_800_000,
                    prefix: prefix("2001:db8::/32"),
                }
                .to_tlv()
                .unwrap()
            },
            expected_hex: "002a000d0036ee80001b77402020010db8000000",
        },
        EncodingVector {
            name: "external connection with dhcpv4 blob",
            build: || {
                ExternalConnection {
                    delegated: None,
                    dhcpv4: Some(Bytes::from_static(&[1, 2, 3])),
                    dhcpv6: None,
                }
                .to_tlv()
                .unwrap()
            },
            expected_hex: "00290008002d000301020300",
        },
    ]
}

/// Get all hash vectors.
pub fn hash_vectors() -> Vec<HashVector> {
    vec![
        HashVector {
            name: "node id derived from \"router-1\"",
            compute: || NodeIdentifier::derive(b"router-1").to_hex(),
            expected_hex: "41cbd084356d987b541cc219ce8d8760",
        },
        HashVector {
            name: "empty node at update 1",
            compute: || {
                node_hash(&NodeIdentifier::from_bytes([0; 16]), 1, &TlvSet::new()).to_hex()
            },
            expected_hex: "07ba3a2cccc47e42da4989f4afd51a61",
        },
        HashVector {
            name: "node with one opaque record",
            compute: || {
                let data: TlvSet = [Tlv::new(1000, b"abc").unwrap()].into_iter().collect();
                node_hash(&NodeIdentifier::from_bytes([0x42; 16]), 7, &data).to_hex()
            },
            expected_hex: "a01872c35435ddbd447650872fcf963f",
        },
        HashVector {
            name: "network of the two nodes above",
            compute: || {
                let data: TlvSet = [Tlv::new(1000, b"abc").unwrap()].into_iter().collect();
                let empty = node_hash(&NodeIdentifier::from_bytes([0; 16]), 1, &TlvSet::new());
                let one = node_hash(&NodeIdentifier::from_bytes([0x42; 16]), 7, &data);
                combine([&empty, &one]).to_hex()
            },
            expected_hex: "0ee16a017c47705552c8a9282ae79560",
        },
    ]
}

/// Check every vector. Returns (name, matches, actual hex) per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let encodings = encoding_vectors().into_iter().map(|v| {
        let actual = hex::encode((v.build)().as_bytes());
        (v.name.to_string(), actual == v.expected_hex, actual)
    });
    let hashes = hash_vectors().into_iter().map(|v| {
        let actual = (v.compute)();
        (v.name.to_string(), actual == v.expected_hex, actual)
    });
    encodings.chain(hashes).collect()
}
