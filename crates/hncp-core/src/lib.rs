//! # HNCP Core
//!
//! Pure primitives for HNCP: the TLV codec, canonical ordering of TLV
//! containers, typed node-data records, node identifiers and digests.
//!
//! This crate contains no I/O, no timers and no protocol state.
//!
//! ## Key Types
//!
//! - [`Tlv`] / [`TlvRef`] - owned and borrowed TLV records
//! - [`TlvSet`] - sorted container builder; the only way containers are made
//! - [`NodeIdentifier`] - the self-assigned identity of a router
//! - [`Digest`] - truncated BLAKE3 hash used for node and network hashes
//! - [`NodeRecord`] - typed view over publishable records
//!
//! ## Canonical Ordering
//!
//! Siblings in any container are strictly ascending by padded encoding. See
//! the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod prefix;
pub mod records;
pub mod tlv;
pub mod types;

pub use canonical::{verify_canonical, TlvSet};
pub use crypto::{Digest, DigestHasher, DIGEST_LEN};
pub use error::{EncodeError, ParseError, TlvError};
pub use prefix::Prefix;
pub use records::{
    container_header_len, read_u32, tlv_type, AssignedPrefix, DelegatedPrefix, ExternalConnection,
    NeighborRecord, NodeRecord, Record, RouterAddress, NODE_STATE_HEADER_LEN,
};
pub use tlv::{
    append_tlv, decode, padded_len, tlvs, Decoded, Tlv, TlvIter, TlvRef, TLV_ALIGN,
    TLV_HEADER_LEN,
};
pub use types::{NodeIdentifier, NODE_ID_LEN};

/// Check a whole datagram or node-data buffer against the ordering invariant,
/// recursing into every container type this crate knows.
pub fn verify_message(buf: &[u8]) -> Result<(), TlvError> {
    verify_canonical(buf, &container_header_len)
}
