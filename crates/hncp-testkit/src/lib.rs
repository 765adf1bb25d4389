//! # HNCP Testkit
//!
//! Testing utilities for HNCP.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Simulator**: a deterministic multi-node network driving real engines
//! - **Golden vectors**: exact wire encodings and hash results
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: topologies and records for setting up test scenarios
//!
//! ## Simulation
//!
//! ```rust
//! use hncp_testkit::{NetSim, Topology};
//!
//! let mut net = Topology::chain(NetSim::new(1), &["a", "b", "c"]);
//! net.converge();
//! assert!(net.sim.is_converged());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use hncp_testkit::generators::node_data;
//!
//! proptest! {
//!     #[test]
//!     fn node_data_is_canonical(data in node_data(8)) {
//!         prop_assert!(hncp_core::verify_message(&data.to_bytes()).is_ok());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod net_sim;
pub mod vectors;

pub use fixtures::{init_tracing, Topology};
pub use net_sim::{link_address, NetSim, NodeHandle, SimStats};
pub use vectors::{encoding_vectors, hash_vectors, verify_all_vectors};
