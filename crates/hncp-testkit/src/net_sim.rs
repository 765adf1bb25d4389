//! Deterministic network simulator.
//!
//! Every node runs a real [`SyncEngine`] against an [`Io`] implementation
//! backed by a shared virtual clock and a list of in-flight datagrams. Links
//! are wired together with directed edges, so one-way connectivity can be
//! modelled. Each datagram is delivered after a random delay of 1 to
//! `max_delay` milliseconds drawn from a seeded RNG, which makes every run
//! reproducible.
//!
//! Every payload a node sends is checked against the ordering invariant; a
//! violation is counted in [`SimStats::ordering_errors`].

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hncp_core::{verify_message, Digest, NodeIdentifier, Tlv};
use hncp_sync::{
    check_convergence, ConvergenceResult, Datagram, Io, SyncConfig, SyncEngine, SyncError,
    HNCP_MULTICAST,
};

/// Virtual time the simulation starts at. Large, so deltas stand out.
pub const START_TIME: i64 = 10_000_000_000_000;

/// Default upper bound on propagation delay, in milliseconds.
pub const MAX_PROPAGATION_DELAY: i64 = 100;

/// Largest origination time disagreement tolerated by [`NetSim::is_converged`].
pub const CONVERGENCE_SKEW_MS: i64 = 5_000;

/// Index of a simulated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(usize);

/// One link of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Endpoint {
    node: NodeHandle,
    link: u32,
}

/// Traffic counters for the whole simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub unicast_sent: u64,
    pub multicast_sent: u64,
    pub delivered: u64,
    pub ordering_errors: u64,
    pub last_unicast_at: Option<i64>,
}

#[derive(Debug)]
struct InFlight {
    readable_at: i64,
    seq: u64,
    to: Endpoint,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    payload: Bytes,
}

struct SimNode {
    name: String,
    engine: SyncEngine,
    want_timeout_at: Option<i64>,
}

/// Everything the nodes share: clock, wiring and the datagrams in flight.
struct Fabric {
    now: i64,
    rng: StdRng,
    max_delay: i64,
    addresses: BTreeMap<Endpoint, Ipv6Addr>,
    wires: BTreeSet<(Endpoint, Endpoint)>,
    in_flight: Vec<InFlight>,
    next_seq: u64,
    stats: SimStats,
}

impl Fabric {
    fn enqueue(&mut self, from: Endpoint, to: Endpoint, dst: Ipv6Addr, payload: &Bytes) {
        let delay = if self.max_delay > 0 {
            self.rng.gen_range(1..=self.max_delay)
        } else {
            1
        };
        let src = self
            .addresses
            .get(&from)
            .copied()
            .unwrap_or(Ipv6Addr::UNSPECIFIED);
        self.in_flight.push(InFlight {
            readable_at: self.now + delay,
            seq: self.next_seq,
            to,
            src,
            dst,
            payload: payload.clone(),
        });
        self.next_seq += 1;
    }
}

/// The [`Io`] a node sees while it is being run.
struct NodeIo<'a> {
    fabric: &'a mut Fabric,
    node: NodeHandle,
    want_timeout_at: &'a mut Option<i64>,
}

impl Io for NodeIo<'_> {
    fn now(&self) -> i64 {
        self.fabric.now
    }

    fn schedule(&mut self, delay_ms: i64) {
        *self.want_timeout_at = Some(self.fabric.now + delay_ms.max(0));
    }

    fn send(&mut self, link: u32, dst: Ipv6Addr, payload: &[u8]) -> hncp_sync::Result<()> {
        let from = Endpoint {
            node: self.node,
            link,
        };
        if !self.fabric.addresses.contains_key(&from) {
            return Err(SyncError::Send {
                link,
                reason: "link not attached to the simulation".into(),
            });
        }

        if let Err(e) = verify_message(payload) {
            self.fabric.stats.ordering_errors += 1;
            tracing::error!(node = self.node.0, link, error = %e, "ordering error in sent payload");
        }

        let multicast = dst == HNCP_MULTICAST;
        if multicast {
            self.fabric.stats.multicast_sent += 1;
        } else {
            self.fabric.stats.unicast_sent += 1;
            self.fabric.stats.last_unicast_at = Some(self.fabric.now);
        }

        let payload = Bytes::copy_from_slice(payload);
        let targets: Vec<Endpoint> = self
            .fabric
            .wires
            .iter()
            .filter(|(src, _)| *src == from)
            .filter(|(_, to)| multicast || self.fabric.addresses.get(to) == Some(&dst))
            .map(|(_, to)| *to)
            .collect();
        for to in targets {
            tracing::trace!(from = ?from, to = ?to, len = payload.len(), multicast, "sendto");
            self.fabric.enqueue(from, to, dst, &payload);
        }
        // Multicast loops back to the sender, as on a real interface.
        if multicast {
            self.fabric.enqueue(from, from, dst, &payload);
        }
        Ok(())
    }

    fn recv(&mut self) -> Option<Datagram> {
        let now = self.fabric.now;
        let (index, _) = self
            .fabric
            .in_flight
            .iter()
            .enumerate()
            .filter(|(_, m)| m.to.node == self.node && m.readable_at <= now)
            .min_by_key(|(_, m)| (m.readable_at, m.seq))?;
        let m = self.fabric.in_flight.swap_remove(index);
        self.fabric.stats.delivered += 1;
        Some(Datagram {
            link: m.to.link,
            src: m.src,
            dst: m.dst,
            payload: m.payload,
        })
    }
}

/// Link-local address for a simulated interface: the interface name's hash
/// xor'ed with the node identifier, under fe80::/64.
pub fn link_address(node: &NodeIdentifier, ifname: &str) -> Ipv6Addr {
    let name = Digest::hash(ifname.as_bytes());
    let mut octets = [0u8; 16];
    octets[0] = 0xfe;
    octets[1] = 0x80;
    for (i, octet) in octets.iter_mut().enumerate().skip(8) {
        *octet = name.0[i] ^ node.0[i];
    }
    Ipv6Addr::from(octets)
}

/// A simulated network of HNCP routers.
pub struct NetSim {
    nodes: BTreeMap<NodeHandle, SimNode>,
    fabric: Fabric,
    next_node: usize,
    seed: u64,
    config: SyncConfig,
}

impl NetSim {
    /// Create an empty network. `seed` drives delays and every node's timers.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            fabric: Fabric {
                now: START_TIME,
                rng: StdRng::seed_from_u64(seed),
                max_delay: MAX_PROPAGATION_DELAY,
                addresses: BTreeMap::new(),
                wires: BTreeSet::new(),
                in_flight: Vec::new(),
                next_seq: 0,
                stats: SimStats::default(),
            },
            next_node: 0,
            seed,
            config: SyncConfig::default(),
        }
    }

    /// Configuration used for nodes added after this call.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Upper bound on propagation delay. Zero delivers everything after 1 ms.
    pub fn with_max_delay(mut self, max_delay: i64) -> Self {
        self.fabric.max_delay = max_delay;
        self
    }

    pub fn now(&self) -> i64 {
        self.fabric.now
    }

    /// Milliseconds since the simulation started.
    pub fn elapsed(&self) -> i64 {
        self.fabric.now - START_TIME
    }

    pub fn stats(&self) -> &SimStats {
        &self.fabric.stats
    }

    /// Add a node whose identifier is derived from `name`.
    pub fn add_node(&mut self, name: &str) -> NodeHandle {
        let config = self.config.clone();
        self.add_node_with_config(name, config)
    }

    pub fn add_node_with_config(&mut self, name: &str, config: SyncConfig) -> NodeHandle {
        let handle = NodeHandle(self.next_node);
        self.next_node += 1;
        let config = config.with_rng_seed(self.seed ^ (handle.0 as u64).wrapping_mul(0x9e37_79b9));
        let engine = SyncEngine::new(
            NodeIdentifier::derive(name.as_bytes()),
            config,
            self.fabric.now,
        );
        self.nodes.insert(
            handle,
            SimNode {
                name: name.to_string(),
                engine,
                want_timeout_at: Some(self.fabric.now),
            },
        );
        handle
    }

    /// Look a node up by the name it was added with.
    pub fn find(&self, name: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|(_, n)| n.name == name)
            .map(|(h, _)| *h)
    }

    pub fn name(&self, node: NodeHandle) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    /// Enable an interface on a node and attach it to the simulation.
    pub fn enable_link(&mut self, node: NodeHandle, ifname: &str) -> hncp_sync::Result<u32> {
        let now = self.fabric.now;
        let sim_node = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| SyncError::UnknownLink(ifname.to_string()))?;
        let address = link_address(&sim_node.engine.own_id(), ifname);
        let link = sim_node.engine.enable_link(ifname, address, now)?;
        sim_node.want_timeout_at = Some(now);
        self.fabric.addresses.insert(Endpoint { node, link }, address);
        Ok(link)
    }

    /// Let `to` hear what `from` sends. One direction only.
    pub fn connect_one_way(&mut self, from: NodeHandle, from_link: u32, to: NodeHandle, to_link: u32) {
        self.fabric.wires.insert((
            Endpoint {
                node: from,
                link: from_link,
            },
            Endpoint {
                node: to,
                link: to_link,
            },
        ));
    }

    /// Connect two interfaces in both directions.
    pub fn connect(&mut self, a: NodeHandle, a_link: u32, b: NodeHandle, b_link: u32) {
        self.connect_one_way(a, a_link, b, b_link);
        self.connect_one_way(b, b_link, a, a_link);
    }

    /// Stop `to` hearing `from`. Datagrams already in flight still arrive.
    pub fn disconnect_one_way(
        &mut self,
        from: NodeHandle,
        from_link: u32,
        to: NodeHandle,
        to_link: u32,
    ) {
        self.fabric.wires.remove(&(
            Endpoint {
                node: from,
                link: from_link,
            },
            Endpoint {
                node: to,
                link: to_link,
            },
        ));
    }

    pub fn disconnect(&mut self, a: NodeHandle, a_link: u32, b: NodeHandle, b_link: u32) {
        self.disconnect_one_way(a, a_link, b, b_link);
        self.disconnect_one_way(b, b_link, a, a_link);
    }

    /// Take a node out of the network, with its wires and pending datagrams.
    pub fn remove_node(&mut self, node: NodeHandle) -> Option<SyncEngine> {
        let removed = self.nodes.remove(&node)?;
        self.fabric
            .wires
            .retain(|(from, to)| from.node != node && to.node != node);
        self.fabric.in_flight.retain(|m| m.to.node != node);
        self.fabric.addresses.retain(|ep, _| ep.node != node);
        Some(removed.engine)
    }

    pub fn engine(&self, node: NodeHandle) -> Option<&SyncEngine> {
        self.nodes.get(&node).map(|n| &n.engine)
    }

    /// Mutable access to a node's engine. The node is run at the current
    /// time so any change reschedules its timers.
    pub fn engine_mut(&mut self, node: NodeHandle) -> Option<&mut SyncEngine> {
        let now = self.fabric.now;
        self.nodes.get_mut(&node).map(|n| {
            n.want_timeout_at = Some(now);
            &mut n.engine
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().copied()
    }

    /// Publish a record on a node.
    pub fn publish(&mut self, node: NodeHandle, tlv: Tlv) -> bool {
        let now = self.fabric.now;
        self.engine_mut(node)
            .map(|e| e.publish(tlv, now))
            .unwrap_or(false)
    }

    pub fn unpublish(&mut self, node: NodeHandle, tlv: &Tlv) -> bool {
        let now = self.fabric.now;
        self.engine_mut(node)
            .map(|e| e.unpublish(tlv, now))
            .unwrap_or(false)
    }

    /// Time of the next timer or delivery, if anything is pending.
    pub fn next_event(&self) -> Option<i64> {
        let timers = self.nodes.values().filter_map(|n| n.want_timeout_at);
        let deliveries = self.fabric.in_flight.iter().map(|m| m.readable_at);
        timers.chain(deliveries).min()
    }

    /// Run every node that has a due timer or a readable datagram. Returns
    /// how many engine calls were made.
    pub fn poll(&mut self) -> usize {
        let now = self.fabric.now;
        let mut calls = 0;
        for (handle, node) in self.nodes.iter_mut() {
            let SimNode {
                engine,
                want_timeout_at,
                ..
            } = node;

            let timer_due = matches!(*want_timeout_at, Some(at) if at <= now);
            let readable = self
                .fabric
                .in_flight
                .iter()
                .any(|m| m.to.node == *handle && m.readable_at <= now);

            let mut io = NodeIo {
                fabric: &mut self.fabric,
                node: *handle,
                want_timeout_at,
            };
            if timer_due {
                *io.want_timeout_at = None;
                engine.run(&mut io);
                calls += 1;
            }
            if readable {
                engine.poll(&mut io);
                calls += 1;
            }
        }
        calls
    }

    /// Poll until nothing is due at the current time.
    pub fn run(&mut self) {
        while self.poll() > 0 {}
    }

    /// Move the clock forward. Time never goes backwards.
    pub fn advance(&mut self, to: i64) {
        if to > self.fabric.now {
            self.fabric.now = to;
        }
    }

    /// Run the current instant, then jump to the next event. Returns false
    /// if nothing is pending.
    pub fn step(&mut self) -> bool {
        self.run();
        match self.next_event() {
            Some(at) => {
                self.advance(at);
                true
            }
            None => false,
        }
    }

    /// Step while `criteria` holds, at most `max_iterations` times. Returns
    /// true if `criteria` stopped holding.
    pub fn run_while(
        &mut self,
        max_iterations: usize,
        mut criteria: impl FnMut(&mut NetSim) -> bool,
    ) -> bool {
        for _ in 0..max_iterations {
            if !criteria(self) {
                return true;
            }
            if !self.step() {
                break;
            }
        }
        !criteria(self)
    }

    /// Process every event up to and including `until`, then set the clock
    /// to `until`.
    pub fn run_until(&mut self, until: i64) {
        loop {
            self.run();
            match self.next_event() {
                Some(at) if at <= until => self.advance(at),
                _ => break,
            }
        }
        self.advance(until);
        self.run();
    }

    /// Run for `ms` milliseconds of virtual time.
    pub fn run_for(&mut self, ms: i64) {
        let until = self.fabric.now + ms;
        self.run_until(until);
    }

    /// Compare every node's view of the network.
    pub fn convergence(&mut self) -> ConvergenceResult {
        check_convergence(
            self.nodes.values_mut().map(|n| &mut n.engine),
            CONVERGENCE_SKEW_MS,
        )
    }

    pub fn is_converged(&mut self) -> bool {
        self.convergence().is_converged()
    }
}
