//! Strong type definitions for HNCP.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{DigestHasher, DIGEST_LEN};
use crate::error::ParseError;

/// Length of a node identifier on the wire.
pub const NODE_ID_LEN: usize = DIGEST_LEN;

/// The self-assigned identity of a router.
///
/// Identifiers order by raw bytes; that order is the node store order and
/// therefore the order in which node hashes enter the network hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdentifier(pub [u8; NODE_ID_LEN]);

impl NodeIdentifier {
    /// Derive an identifier from a seed such as a router name or hardware
    /// addresses.
    pub fn derive(seed: &[u8]) -> Self {
        let digest = DigestHasher::new()
            .update(b"hncp-node-id-v0:")
            .update(seed)
            .finalize();
        Self(digest.0)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != NODE_ID_LEN {
            return Err(hex::FromHexError::InvalidStringLength.into());
        }
        let mut arr = [0u8; NODE_ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub const ZERO: Self = Self([0u8; NODE_ID_LEN]);
}

impl fmt::Debug for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentifier({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for NodeIdentifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeIdentifier {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for NodeIdentifier {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; NODE_ID_LEN] = slice.try_into()?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_hex_roundtrip() {
        let id = NodeIdentifier::derive(b"router-a");
        let recovered = NodeIdentifier::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_node_id_from_hex_wrong_length() {
        assert_eq!(
            NodeIdentifier::from_hex("abcd"),
            Err(ParseError::Hex(hex::FromHexError::InvalidStringLength))
        );
    }

    #[test]
    fn test_node_id_from_hex_bad_digit() {
        let err = NodeIdentifier::from_hex(&"zz".repeat(NODE_ID_LEN)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        ));
        assert!(err.to_string().starts_with("invalid hex"));
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeIdentifier::from_bytes([0xab; NODE_ID_LEN]);
        assert_eq!(format!("{}", id), "abababababababab");
    }

    #[test]
    fn test_node_id_orders_by_bytes() {
        let mut low = [0u8; NODE_ID_LEN];
        low[0] = 1;
        let mut high = [0u8; NODE_ID_LEN];
        high[0] = 2;
        assert!(NodeIdentifier(low) < NodeIdentifier(high));
    }
}
