//! Read-only debug snapshot of an engine's view of the network.
//!
//! Built only from public accessors, so taking a snapshot never changes the
//! engine. Records that do not decode are left out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hncp_core::{DelegatedPrefix, ExternalConnection, NodeRecord};
use hncp_store::{Node, NodeStore};
use hncp_sync::{SyncEngine, PROTOCOL_VERSION};

use crate::error::Result;

/// The whole snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub time: i64,
    pub node_id: String,
    /// Link name to interface id.
    pub links: BTreeMap<String, u32>,
    /// Node identifier (hex) to node.
    pub nodes: BTreeMap<String, NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub version: u8,
    pub update: u32,
    /// Milliseconds since origination.
    pub age: i64,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    pub neighbors: Vec<NeighborSnapshot>,
    pub prefixes: Vec<PrefixSnapshot>,
    pub uplinks: Vec<UplinkSnapshot>,
    pub addresses: Vec<AddressSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NeighborSnapshot {
    pub node_id: String,
    pub local_link: u32,
    pub neighbor_link: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSnapshot {
    pub prefix: String,
    pub authoritative: bool,
    pub priority: u8,
    pub link: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedSnapshot {
    pub prefix: String,
    pub valid: u32,
    pub preferred: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkSnapshot {
    pub delegated: Vec<DelegatedSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcpv6: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AddressSnapshot {
    pub address: String,
    pub link_id: u32,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Take a snapshot of `engine` as of `now`.
pub fn dump<S: NodeStore>(engine: &SyncEngine<S>, now: i64) -> Snapshot {
    let own = engine.own_id();
    let links = engine
        .links()
        .iter()
        .map(|l| (l.name().to_string(), l.id()))
        .collect();
    let nodes = engine
        .store()
        .nodes()
        .map(|n| (n.identifier().to_hex(), node(n, now, *n.identifier() == own)))
        .collect();

    Snapshot {
        time: now,
        node_id: own.to_hex(),
        links,
        nodes,
    }
}

fn node(n: &Node, now: i64, is_self: bool) -> NodeSnapshot {
    let mut snapshot = NodeSnapshot {
        version: PROTOCOL_VERSION,
        update: n.update_number(),
        age: n.age(now),
        is_self: is_self.then_some(true),
        neighbors: Vec::new(),
        prefixes: Vec::new(),
        uplinks: Vec::new(),
        addresses: Vec::new(),
    };

    for record in n.records() {
        match record {
            NodeRecord::Neighbor(nr) => snapshot.neighbors.push(NeighborSnapshot {
                node_id: nr.neighbor.to_hex(),
                local_link: nr.link_id,
                neighbor_link: nr.neighbor_link_id,
            }),
            NodeRecord::AssignedPrefix(ap) => snapshot.prefixes.push(PrefixSnapshot {
                prefix: ap.prefix.to_string(),
                authoritative: ap.authoritative,
                priority: ap.priority,
                link: ap.link_id,
            }),
            NodeRecord::ExternalConnection(ec) => snapshot.uplinks.push(uplink(&ec)),
            NodeRecord::RouterAddress(ra) => snapshot.addresses.push(AddressSnapshot {
                address: ra.address.to_string(),
                link_id: ra.link_id,
            }),
            NodeRecord::Unknown(_) => {}
        }
    }
    snapshot
}

fn uplink(ec: &ExternalConnection) -> UplinkSnapshot {
    let delegated = ec
        .delegated
        .iter()
        .map(|dp: &DelegatedPrefix| DelegatedSnapshot {
            prefix: dp.prefix.to_string(),
            valid: dp.ms_valid_at_origination,
            preferred: dp.ms_preferred_at_origination,
        })
        .collect();
    UplinkSnapshot {
        delegated,
        dhcpv4: ec.dhcpv4.as_ref().filter(|b| !b.is_empty()).map(hex::encode),
        dhcpv6: ec.dhcpv6.as_ref().filter(|b| !b.is_empty()).map(hex::encode),
    }
}
