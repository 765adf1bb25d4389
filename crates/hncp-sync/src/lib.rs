//! # HNCP Sync
//!
//! The synchronization engine: keeps every router's copy of every node's
//! published data identical, using as little multicast as it can.
//!
//! ## Overview
//!
//! Each [`SyncEngine`] owns a node store, its links and their neighbors, and
//! one Trickle timer per link. Routers compare a single network hash; only
//! when it differs do they exchange node summaries and then the node data
//! that is actually newer.
//!
//! ## Key Properties
//!
//! - **Sans-I/O**: the engine talks to the world only through [`Io`]
//! - **Newer wins**: update numbers are authoritative, origination time is not
//! - **Quiet when stable**: at most one announcement per link per `imax`
//! - **Never panics on input**: malformed data is dropped and counted in
//!   [`Diagnostics`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hncp_core::NodeIdentifier;
//! use hncp_sync::{Io, SyncConfig, SyncEngine};
//!
//! fn example(io: &mut impl Io) -> hncp_sync::Result<()> {
//!     let id = NodeIdentifier::derive(b"router-1");
//!     let mut engine = SyncEngine::new(id, SyncConfig::default(), io.now());
//!     engine.enable_link("eth0", "fe80::1".parse().unwrap(), io.now())?;
//!
//!     // Call whenever a datagram arrives or the scheduled wakeup is due.
//!     engine.poll(io);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Node A                                 Node B
//!   |-- LINK_ID NETWORK_HASH NODE_STATE* ->|   Trickle announcement
//!   |<--------- LINK_ID REQ_NODE_DATA* ----|   hash differs, A is newer
//!   |-- LINK_ID NODE_STATE(NODE_DATA) ---->|   one per requested node
//!   |<-- LINK_ID NETWORK_HASH NODE_STATE* -|   B changed, resets its Trickle
//! ```

pub mod convergence;
pub mod error;
pub mod io;
pub mod links;
pub mod messages;
pub mod protocol;
pub mod trickle;

pub use convergence::{check_convergence, ConvergenceResult};
pub use error::{Result, SyncError};
pub use io::{Datagram, Io, HNCP_MULTICAST, HNCP_PORT};
pub use links::{Link, LinkManager, LivenessAction, Neighbor, NeighborEvent};
pub use messages::{
    LinkId, Message, MessageBuilder, NetworkHash, NodeState, ReqNetHash, ReqNodeData,
    PROTOCOL_VERSION,
};
pub use protocol::{Diagnostics, SyncConfig, SyncEngine};
pub use trickle::Trickle;
