//! Test fixtures and helpers.
//!
//! Common topologies and records for integration tests.

use std::net::Ipv6Addr;
use std::sync::Once;
use std::time::Duration;

use hncp_core::{AssignedPrefix, NodeIdentifier, Prefix, Record, RouterAddress, Tlv};
use hncp_sync::SyncConfig;

use crate::net_sim::{NetSim, NodeHandle};

/// Iteration cap for `run_while` loops in tests.
pub const MAX_ITERATIONS: usize = 100_000;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Timers scaled down so removal scenarios finish in little virtual time.
pub fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_neighbor_timeout(Duration::from_secs(10))
        .with_node_grace_period(Duration::from_secs(5))
}

pub fn node_id(name: &str) -> NodeIdentifier {
    NodeIdentifier::derive(name.as_bytes())
}

/// An authoritative assigned prefix record.
pub fn assigned_prefix(prefix: &str, link_id: u32, priority: u8) -> AssignedPrefix {
    AssignedPrefix {
        link_id,
        authoritative: true,
        priority,
        prefix: prefix.parse::<Prefix>().unwrap(),
    }
}

pub fn router_address(address: &str, link_id: u32) -> RouterAddress {
    RouterAddress {
        address: address.parse::<Ipv6Addr>().unwrap(),
        link_id,
    }
}

/// Encode any record for publishing.
pub fn tlv<R: Record>(record: &R) -> Tlv {
    record.to_tlv().unwrap()
}

/// A network of nodes built from names and point-to-point links.
pub struct Topology {
    pub sim: NetSim,
    pub nodes: Vec<NodeHandle>,
}

impl Topology {
    /// Nodes with no links yet.
    pub fn nodes(mut sim: NetSim, names: &[&str]) -> Self {
        let nodes = names.iter().map(|n| sim.add_node(n)).collect();
        Self { sim, nodes }
    }

    /// Connect node `a` and node `b` (indexes into `nodes`) through a fresh
    /// interface on each. Returns the two interface ids.
    pub fn link(&mut self, a: usize, b: usize) -> (u32, u32) {
        let (ha, hb) = (self.nodes[a], self.nodes[b]);
        let la = self.sim.enable_link(ha, &format!("to-{b}")).unwrap();
        let lb = self.sim.enable_link(hb, &format!("to-{a}")).unwrap();
        self.sim.connect(ha, la, hb, lb);
        (la, lb)
    }

    /// `a - b - c - ...`
    pub fn chain(sim: NetSim, names: &[&str]) -> Self {
        let mut t = Self::nodes(sim, names);
        for i in 1..names.len() {
            t.link(i - 1, i);
        }
        t
    }

    /// Every node linked to the first.
    pub fn star(sim: NetSim, names: &[&str]) -> Self {
        let mut t = Self::nodes(sim, names);
        for i in 1..names.len() {
            t.link(0, i);
        }
        t
    }

    /// Every node on one shared segment, one interface each.
    pub fn shared_segment(mut sim: NetSim, names: &[&str]) -> Self {
        let nodes: Vec<NodeHandle> = names.iter().map(|n| sim.add_node(n)).collect();
        let links: Vec<u32> = nodes
            .iter()
            .map(|&h| sim.enable_link(h, "lan").unwrap())
            .collect();
        for i in 0..nodes.len() {
            for j in 0..nodes.len() {
                if i != j {
                    sim.connect_one_way(nodes[i], links[i], nodes[j], links[j]);
                }
            }
        }
        Self { sim, nodes }
    }

    /// Run until every node agrees. Panics if that takes too long.
    pub fn converge(&mut self) {
        let converged = self.sim.run_while(MAX_ITERATIONS, |s| !s.is_converged());
        assert!(
            converged,
            "not converged after {} ms: {:?}",
            self.sim.elapsed(),
            self.sim.convergence()
        );
    }
}
