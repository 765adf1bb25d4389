//! # HNCP Store
//!
//! The per-router replica of every node's published data.
//!
//! ## Key Types
//!
//! - [`NodeStore`] - the trait the synchronization engine is written against
//! - [`MemoryStore`] - ordered in-memory implementation
//! - [`Node`] - one router's data with its cached hash
//! - [`HashEngine`] - lazily cached network hash
//! - [`UpsertResult`] - outcome of merging a received node
//!
//! ## Design Notes
//!
//! - **Newer wins**: only a strictly greater update number replaces data
//! - **Lazy hashing**: node and network hashes are computed on read and
//!   cached until a mutation invalidates them
//! - **Reachability** is derived from published neighbor records; see
//!   [`reachability`]

pub mod error;
pub mod hash;
pub mod memory;
pub mod node;
pub mod reachability;
pub mod traits;

pub use error::{Result, StoreError};
pub use hash::HashEngine;
pub use memory::MemoryStore;
pub use node::{node_hash, Node};
pub use reachability::{reachable_nodes, unreachable_nodes};
pub use traits::{NodeStore, UpsertResult};
