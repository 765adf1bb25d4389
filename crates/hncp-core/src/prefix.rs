//! IPv6 prefixes as carried in prefix records.
//!
//! On the wire a prefix is a length in bits followed by the network bytes,
//! big-endian, packed to `ceil(len / 8)` bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::error::ParseError;

/// An IPv6 prefix with its host bits cleared.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Prefix {
    addr: Ipv6Addr,
    len: u8,
}

impl Prefix {
    /// Create a prefix, masking off host bits. Lengths above 128 are rejected.
    pub fn new(addr: Ipv6Addr, len: u8) -> Option<Self> {
        if len > 128 {
            return None;
        }
        let bits = u128::from(addr);
        let mask = if len == 0 { 0 } else { u128::MAX << (128 - len as u32) };
        Some(Self {
            addr: Ipv6Addr::from(bits & mask),
            len,
        })
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// Number of bytes the packed form occupies.
    pub fn packed_len(len: u8) -> usize {
        (len as usize + 7) / 8
    }

    /// The packed network bytes.
    pub fn packed(&self) -> Vec<u8> {
        self.addr.octets()[..Self::packed_len(self.len)].to_vec()
    }

    /// Rebuild from a bit length and at least `packed_len(len)` bytes.
    pub fn from_packed(len: u8, data: &[u8]) -> Option<Self> {
        if len > 128 {
            return None;
        }
        let n = Self::packed_len(len);
        if data.len() < n {
            return None;
        }
        let mut octets = [0u8; 16];
        octets[..n].copy_from_slice(&data[..n]);
        Self::new(Ipv6Addr::from(octets), len)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({}/{})", self.addr, self.len)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| ParseError::Prefix(format!("missing length in {s:?}")))?;
        let addr: Ipv6Addr = addr
            .parse()
            .map_err(|_| ParseError::Prefix(format!("bad address in {s:?}")))?;
        let len: u8 = len
            .parse()
            .map_err(|_| ParseError::Prefix(format!("bad length in {s:?}")))?;
        Self::new(addr, len).ok_or_else(|| ParseError::Prefix(format!("length {len} > 128")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_bits_cleared() {
        let p: Prefix = "2001:db8::1/64".parse().unwrap();
        assert_eq!(p.addr(), "2001:db8::".parse::<Ipv6Addr>().unwrap());
        assert_eq!(p.to_string(), "2001:db8::/64");
    }

    #[test]
    fn test_packed_lengths() {
        assert_eq!(Prefix::packed_len(0), 0);
        assert_eq!(Prefix::packed_len(1), 1);
        assert_eq!(Prefix::packed_len(56), 7);
        assert_eq!(Prefix::packed_len(64), 8);
        assert_eq!(Prefix::packed_len(128), 16);
    }

    #[test]
    fn test_odd_length_packing() {
        let p: Prefix = "2001:db8:ffff::/35".parse().unwrap();
        let packed = p.packed();
        assert_eq!(packed.len(), 5);
        assert_eq!(packed[4], 0xe0);
        assert_eq!(Prefix::from_packed(35, &packed), Some(p));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(Prefix::new(Ipv6Addr::UNSPECIFIED, 129).is_none());
        assert!(Prefix::from_packed(64, &[0x20, 0x01]).is_none());
        assert!("2001:db8::/200".parse::<Prefix>().is_err());
        assert!("2001:db8::".parse::<Prefix>().is_err());
    }
}
