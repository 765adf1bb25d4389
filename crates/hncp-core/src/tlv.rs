//! TLV framing.
//!
//! Every record is a 4-byte header (big-endian 16-bit type, big-endian 16-bit
//! payload length) followed by the payload and zero padding up to a 4-byte
//! boundary. The length field never counts the padding, but the padding is
//! part of the record's encoding: it counts toward container sizes and toward
//! the byte order of siblings.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::canonical::TlvSet;
use crate::error::TlvError;

/// Size of the fixed TLV header.
pub const TLV_HEADER_LEN: usize = 4;

/// Records are padded to this alignment.
pub const TLV_ALIGN: usize = 4;

/// Round a payload length up to the alignment boundary.
pub const fn padded_len(len: usize) -> usize {
    (len + TLV_ALIGN - 1) & !(TLV_ALIGN - 1)
}

/// Append one record to a buffer being assembled by hand.
///
/// Used for containers whose children are written in an order already known
/// to be canonical.
pub fn append_tlv(out: &mut Vec<u8>, ty: u16, payload: &[u8]) -> Result<(), TlvError> {
    let len = u16::try_from(payload.len()).map_err(|_| TlvError::PayloadTooLarge(payload.len()))?;
    out.extend_from_slice(&ty.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out.resize(out.len() + padded_len(payload.len()) - payload.len(), 0);
    Ok(())
}

/// An owned, encoded TLV record.
///
/// Records compare by their full padded encoding, which is exactly the order
/// siblings must appear in on the wire.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tlv {
    encoded: Bytes,
}

impl Tlv {
    /// Encode a record from its type and payload.
    pub fn new(ty: u16, payload: &[u8]) -> Result<Self, TlvError> {
        Self::with_parts(ty, &[payload])
    }

    /// Encode a container record: a fixed header followed by sorted children.
    pub fn container(ty: u16, header: &[u8], children: &TlvSet) -> Result<Self, TlvError> {
        let body = children.to_bytes();
        Self::with_parts(ty, &[header, &body])
    }

    fn with_parts(ty: u16, parts: &[&[u8]]) -> Result<Self, TlvError> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let len16 = u16::try_from(len).map_err(|_| TlvError::PayloadTooLarge(len))?;

        let mut buf = BytesMut::with_capacity(TLV_HEADER_LEN + padded_len(len));
        buf.put_u16(ty);
        buf.put_u16(len16);
        for part in parts {
            buf.put_slice(part);
        }
        buf.put_bytes(0, padded_len(len) - len);

        Ok(Self {
            encoded: buf.freeze(),
        })
    }

    /// The record type.
    pub fn ty(&self) -> u16 {
        u16::from_be_bytes([self.encoded[0], self.encoded[1]])
    }

    /// Logical payload length (padding excluded).
    pub fn len(&self) -> usize {
        u16::from_be_bytes([self.encoded[2], self.encoded[3]]) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The payload without padding.
    pub fn payload(&self) -> &[u8] {
        &self.encoded[TLV_HEADER_LEN..TLV_HEADER_LEN + self.len()]
    }

    /// The full padded encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Borrow as a decoded record view.
    pub fn view(&self) -> TlvRef<'_> {
        TlvRef {
            ty: self.ty(),
            payload: self.payload(),
            raw: &self.encoded,
            offset: 0,
        }
    }
}

impl fmt::Debug for Tlv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tlv(type={}, len={})", self.ty(), self.len())
    }
}

/// A record borrowed from a received buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TlvRef<'a> {
    ty: u16,
    payload: &'a [u8],
    raw: &'a [u8],
    offset: usize,
}

impl<'a> TlvRef<'a> {
    pub fn ty(&self) -> u16 {
        self.ty
    }

    /// The payload without padding.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The full padded encoding.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Offset of the record inside the buffer it was decoded from.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Iterate the nested records of a container whose payload is all TLVs.
    pub fn children(&self) -> TlvIter<'a> {
        TlvIter::with_base(self.payload, self.offset + TLV_HEADER_LEN)
    }

    /// Iterate the nested records that follow a fixed-size header.
    pub fn children_after(&self, header_len: usize) -> Result<TlvIter<'a>, TlvError> {
        if self.payload.len() < header_len {
            return Err(TlvError::InvalidPayload {
                ty: self.ty,
                reason: "payload shorter than container header",
            });
        }
        Ok(TlvIter::with_base(
            &self.payload[header_len..],
            self.offset + TLV_HEADER_LEN + header_len,
        ))
    }

    /// Copy into an owned record.
    pub fn to_tlv(&self) -> Tlv {
        Tlv {
            encoded: Bytes::copy_from_slice(self.raw),
        }
    }
}

impl fmt::Debug for TlvRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TlvRef(type={}, len={}, offset={})",
            self.ty,
            self.payload.len(),
            self.offset
        )
    }
}

/// Lazy iteration over sibling records.
///
/// The iterator is cheap to clone, so a sequence can be walked again from
/// the start. It stops after the first framing error, because the position
/// of the next sibling can no longer be trusted.
#[derive(Clone, Debug)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
    failed: bool,
}

impl<'a> TlvIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self {
            buf,
            pos: 0,
            base,
            failed: false,
        }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<TlvRef<'a>, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }

        let offset = self.base + self.pos;
        let rest = &self.buf[self.pos..];
        if rest.len() < TLV_HEADER_LEN {
            self.failed = true;
            return Some(Err(TlvError::TruncatedHeader {
                offset,
                remaining: rest.len(),
            }));
        }

        let ty = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        let total = TLV_HEADER_LEN + padded_len(len);
        if total > rest.len() {
            self.failed = true;
            return Some(Err(TlvError::MalformedRecord {
                offset,
                declared: padded_len(len),
                remaining: rest.len() - TLV_HEADER_LEN,
            }));
        }

        self.pos += total;
        Some(Ok(TlvRef {
            ty,
            payload: &rest[TLV_HEADER_LEN..TLV_HEADER_LEN + len],
            raw: &rest[..total],
            offset,
        }))
    }
}

impl std::iter::FusedIterator for TlvIter<'_> {}

/// Iterate the top-level records of a buffer.
pub fn tlvs(buf: &[u8]) -> TlvIter<'_> {
    TlvIter::new(buf)
}

/// Records decoded before the first framing error, plus that error.
#[derive(Debug, Default)]
pub struct Decoded<'a> {
    pub records: Vec<TlvRef<'a>>,
    pub error: Option<TlvError>,
}

/// Eagerly decode all siblings, keeping whatever parsed before an error.
pub fn decode(buf: &[u8]) -> Decoded<'_> {
    let mut decoded = Decoded::default();
    for item in tlvs(buf) {
        match item {
            Ok(record) => decoded.records.push(record),
            Err(e) => decoded.error = Some(e),
        }
    }
    decoded
}
