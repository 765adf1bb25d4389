//! Error types for the store module.

use hncp_core::NodeIdentifier;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The operation would touch the local node through the remote path.
    ///
    /// The local node is only changed by [`crate::NodeStore::publish_self`]
    /// and [`crate::NodeStore::bump_self_update_number`], and is never removed.
    #[error("node {0} is the local node")]
    OwnNode(NodeIdentifier),

    /// Node not found.
    #[error("node not found: {0}")]
    NotFound(NodeIdentifier),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
