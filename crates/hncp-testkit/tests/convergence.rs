//! Convergence of simulated networks.
//!
//! Every topology must reach a single network hash, with origination times
//! agreeing to within five seconds, and no node may ever send a payload that
//! violates the ordering invariant.

use proptest::prelude::*;

use hncp_store::NodeStore;
use hncp_testkit::fixtures::{init_tracing, Topology, MAX_ITERATIONS};
use hncp_testkit::NetSim;

fn assert_clean(t: &Topology) {
    assert_eq!(t.sim.stats().ordering_errors, 0);
    for &h in &t.nodes {
        let d = t.sim.engine(h).unwrap().diagnostics();
        assert_eq!(d.hash_mismatches, 0);
        assert_eq!(d.malformed_records, 0);
        assert_eq!(d.encode_failures, 0);
    }
}

#[test]
fn test_two_nodes_converge() {
    init_tracing();
    let mut t = Topology::chain(NetSim::new(1), &["a", "b"]);
    t.converge();
    assert_clean(&t);

    // Each knows both nodes.
    for &h in &t.nodes {
        assert_eq!(t.sim.engine(h).unwrap().store().len(), 2);
    }
}

#[test]
fn test_chain_converges() {
    init_tracing();
    let mut t = Topology::chain(NetSim::new(2), &["a", "b", "c", "d", "e"]);
    t.converge();
    assert_clean(&t);
    assert!(t.sim.elapsed() < 60_000, "took {} ms", t.sim.elapsed());
}

#[test]
fn test_star_converges() {
    init_tracing();
    let mut t = Topology::star(NetSim::new(3), &["hub", "s1", "s2", "s3", "s4"]);
    t.converge();
    assert_clean(&t);

    let hub = t.sim.engine(t.nodes[0]).unwrap();
    assert_eq!(hub.links().len(), 4);
}

#[test]
fn test_shared_segment_converges() {
    init_tracing();
    let mut t = Topology::shared_segment(NetSim::new(4), &["a", "b", "c", "d", "e", "f"]);
    t.converge();
    assert_clean(&t);

    for &h in &t.nodes {
        let link = t.sim.engine(h).unwrap().links().by_name("lan").unwrap();
        assert_eq!(link.neighbor_count(), 5);
    }
}

#[test]
fn test_converges_for_several_seeds() {
    for seed in 10..15 {
        let mut t = Topology::chain(NetSim::new(seed), &["a", "b", "c", "d"]);
        t.converge();
        assert_clean(&t);
    }
}

#[test]
fn test_stays_converged() {
    let mut t = Topology::chain(NetSim::new(5), &["a", "b", "c"]);
    t.converge();
    t.sim.run_for(300_000);
    assert!(t.sim.is_converged());
    for &h in &t.nodes {
        let d = t.sim.engine(h).unwrap().diagnostics();
        assert_eq!(d.neighbors_dropped, 0);
        assert_eq!(d.nodes_removed, 0);
    }
}

#[test]
fn test_zero_delay_converges() {
    let mut t = Topology::chain(NetSim::new(6).with_max_delay(0), &["a", "b", "c"]);
    let converged = t.sim.run_while(MAX_ITERATIONS, |s| !s.is_converged());
    assert!(converged);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn random_tree_converges(seed in any::<u64>(), parents in prop::collection::vec(any::<usize>(), 1..6)) {
        let names: Vec<String> = (0..=parents.len()).map(|i| format!("n{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut t = Topology::nodes(NetSim::new(seed), &refs);
        for (i, p) in parents.iter().enumerate() {
            let child = i + 1;
            t.link(p % child, child);
        }
        t.converge();
        prop_assert_eq!(t.sim.stats().ordering_errors, 0);
    }
}
