//! Error types for the sync module.

use thiserror::Error;

use hncp_core::{EncodeError, TlvError};
use hncp_store::StoreError;

/// Errors that can occur during sync operations.
///
/// None of these abort the engine: input-derived errors are counted and
/// logged, and the offending datagram or record is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A datagram produced no usable records.
    #[error("decode error: {0}")]
    Decode(#[from] TlvError),

    /// A datagram contained no records at all.
    #[error("empty message")]
    EmptyMessage,

    /// Building an outbound message failed; the buffer has been released.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No link with this name or interface id.
    #[error("unknown link: {0}")]
    UnknownLink(String),

    /// A link with this name is already enabled.
    #[error("link already enabled: {0}")]
    DuplicateLink(String),

    /// The I/O boundary could not send a datagram.
    #[error("send failed on link {link}: {reason}")]
    Send { link: u32, reason: String },
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
