//! Error types for the HNCP facade.

use hncp_core::TlvError;
use hncp_store::StoreError;
use hncp_sync::SyncError;
use thiserror::Error;

/// Errors that can occur in the facade and the UDP host.
#[derive(Debug, Error)]
pub enum HncpError {
    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Record encoding error.
    #[error("record error: {0}")]
    Tlv(#[from] TlvError),

    /// Socket error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration names no links.
    #[error("no links configured")]
    NoLinks,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, HncpError>;
