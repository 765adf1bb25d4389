//! # HNCP
//!
//! Node-state synchronization for home networks: every router keeps an
//! identical copy of the data every other router publishes.
//!
//! ## Overview
//!
//! - **Records**: typed node data (prefixes, addresses, uplinks, neighbors)
//! - **Engine**: the sans-I/O synchronization state machine
//! - **Host**: the engine on real IPv6 UDP sockets, driven by tokio
//! - **Snapshots**: a JSON view of one router's picture of the network
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hncp::{HncpConfig, LinkConfig, UdpHost};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = HncpConfig::default()
//!         .with_link(LinkConfig::new("eth0", 2, "fe80::1".parse()?));
//!     let mut host = UdpHost::bind(config).await?;
//!     host.run(std::future::pending()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hncp::core` - TLV codec, records, identifiers
//! - `hncp::store` - node store and hashing
//! - `hncp::sync` - engine, Trickle, links, messages

pub mod config;
pub mod dump;
pub mod error;
pub mod host;

// Re-export component crates
pub use hncp_core as core;
pub use hncp_store as store;
pub use hncp_sync as sync;

pub use config::{HncpConfig, LinkConfig};
pub use dump::{dump, Snapshot};
pub use error::{HncpError, Result};
pub use host::{LinkMap, UdpHost};

// Re-export commonly used types
pub use hncp_core::{Digest, NodeIdentifier, NodeRecord, Prefix, Tlv, TlvSet};
pub use hncp_sync::{Diagnostics, SyncConfig, SyncEngine};
