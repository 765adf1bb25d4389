//! Debug snapshots of a converged simulated network.

use bytes::Bytes;
use proptest::prelude::*;
use serde_json::Value;

use hncp::core::{DelegatedPrefix, ExternalConnection};
use hncp::{dump, NodeIdentifier, Snapshot, SyncConfig, SyncEngine, TlvSet};
use hncp_testkit::fixtures::{assigned_prefix, node_id, router_address, tlv, Topology};
use hncp_testkit::{generators, NetSim};

fn converged_pair() -> Topology {
    let mut t = Topology::chain(NetSim::new(41), &["a", "b"]);
    t.converge();

    let a = t.nodes[0];
    t.sim.publish(a, tlv(&assigned_prefix("2001:db8:1::/64", 1, 2)));
    t.sim.publish(a, tlv(&router_address("2001:db8:1::1", 1)));
    t.sim.publish(
        a,
        tlv(&ExternalConnection {
            delegated: Some(DelegatedPrefix {
                ms_valid_at_origination: 7_200_000,
                ms_preferred_at_origination: 3_600_000,
                prefix: "2001:db8::/48".parse().unwrap(),
            }),
            dhcpv4: Some(Bytes::from_static(&[0x06, 0x04, 0xc0, 0x00, 0x02, 0x01])),
            dhcpv6: None,
        }),
    );
    t.converge();
    t
}

#[test]
fn test_snapshot_of_remote_node() {
    let t = converged_pair();
    let b = t.sim.engine(t.nodes[1]).unwrap();
    let snapshot = dump(b, t.sim.now());

    assert_eq!(snapshot.node_id, node_id("b").to_hex());
    assert_eq!(snapshot.links.len(), 1);
    assert_eq!(snapshot.nodes.len(), 2);

    let a = &snapshot.nodes[&node_id("a").to_hex()];
    assert_eq!(a.is_self, None);
    assert!(a.age >= 0);

    assert_eq!(a.prefixes.len(), 1);
    assert_eq!(a.prefixes[0].prefix, "2001:db8:1::/64");
    assert!(a.prefixes[0].authoritative);
    assert_eq!(a.prefixes[0].priority, 2);

    assert_eq!(a.addresses.len(), 1);
    assert_eq!(a.addresses[0].address, "2001:db8:1::1");

    assert_eq!(a.uplinks.len(), 1);
    assert_eq!(a.uplinks[0].delegated[0].prefix, "2001:db8::/48");
    assert_eq!(a.uplinks[0].delegated[0].valid, 7_200_000);
    assert_eq!(a.uplinks[0].dhcpv4.as_deref(), Some("0604c0000201"));
    assert_eq!(a.uplinks[0].dhcpv6, None);

    assert_eq!(a.neighbors.len(), 1);
    assert_eq!(a.neighbors[0].node_id, node_id("b").to_hex());
}

#[test]
fn test_snapshot_json_shape() {
    let t = converged_pair();
    let a = t.sim.engine(t.nodes[0]).unwrap();
    let json = dump(a, t.sim.now()).to_json().unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();

    assert!(value["time"].is_i64());
    let own = value["node-id"].as_str().unwrap();
    assert_eq!(value["nodes"][own]["self"], Value::Bool(true));

    let neighbor = &value["nodes"][own]["neighbors"][0];
    assert!(neighbor["node-id"].is_string());
    assert!(neighbor["local-link"].is_u64());
    assert!(neighbor["neighbor-link"].is_u64());
    assert!(value["nodes"][own]["addresses"][0]["link-id"].is_u64());

    // Round trip through serde.
    let back: Snapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, dump(a, t.sim.now()));
}

#[test]
fn test_snapshot_does_not_change_engine() {
    let mut t = converged_pair();
    let hash = t.sim.engine_mut(t.nodes[0]).unwrap().network_hash();
    let before = t.sim.engine(t.nodes[0]).unwrap().diagnostics().clone();

    let _ = dump(t.sim.engine(t.nodes[0]).unwrap(), t.sim.now());

    assert_eq!(t.sim.engine(t.nodes[0]).unwrap().diagnostics(), &before);
    assert_eq!(t.sim.engine(t.nodes[0]).unwrap().cached_network_hash(), Some(hash));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_published_prefix_listed(
        records in proptest::collection::vec(generators::assigned_prefix(), 0..12),
    ) {
        let mut engine = SyncEngine::new(
            NodeIdentifier::derive(b"solo"),
            SyncConfig::default().with_rng_seed(3),
            0,
        );
        for record in &records {
            engine.publish(tlv(record), 0);
        }

        let distinct: TlvSet = records.iter().map(tlv).collect();

        let snapshot = dump(&engine, 0);
        let own = &snapshot.nodes[&snapshot.node_id];
        prop_assert_eq!(own.prefixes.len(), distinct.len());
        for record in &records {
            let found = own.prefixes.iter().any(|p| {
                p.prefix == record.prefix.to_string()
                    && p.authoritative == record.authoritative
                    && p.priority == record.priority
                    && p.link == record.link_id
            });
            prop_assert!(found, "prefix {:?} missing", record);
        }
    }
}
