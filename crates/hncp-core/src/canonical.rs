//! Canonical ordering of TLV containers.
//!
//! Within every container (and within a whole datagram) siblings appear in
//! strictly ascending byte order of their padded encodings. [`TlvSet`] keeps
//! records sorted as they are inserted, so encoders built on it cannot emit
//! an out-of-order container. [`verify_canonical`] checks received buffers.

use std::collections::BTreeSet;

use crate::error::{EncodeError, TlvError};
use crate::tlv::{tlvs, Tlv, TlvIter};

/// A sorted, duplicate-free set of records: the only way containers are built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TlvSet {
    records: BTreeSet<Tlv>,
}

impl TlvSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record in sorted position. Returns false if it was present.
    pub fn insert(&mut self, tlv: Tlv) -> bool {
        self.records.insert(tlv)
    }

    pub fn remove(&mut self, tlv: &Tlv) -> bool {
        self.records.remove(tlv)
    }

    pub fn contains(&self, tlv: &Tlv) -> bool {
        self.records.contains(tlv)
    }

    /// Keep only the records matching the predicate.
    pub fn retain(&mut self, f: impl FnMut(&Tlv) -> bool) {
        self.records.retain(f);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &Tlv> + '_ {
        self.records.iter()
    }

    /// Records of one type, in wire order.
    pub fn of_type(&self, ty: u16) -> impl Iterator<Item = &Tlv> + '_ {
        self.records.iter().filter(move |t| t.ty() == ty)
    }

    /// Size of the concatenated encoding.
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(|t| t.as_bytes().len()).sum()
    }

    /// Append the encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for tlv in &self.records {
            out.extend_from_slice(tlv.as_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Encode as a complete outbound message no larger than `max_len`.
    ///
    /// The buffer is reserved up front; on failure nothing is returned and
    /// nothing stays allocated.
    pub fn encode_bounded(&self, max_len: usize) -> Result<Vec<u8>, EncodeError> {
        let len = self.encoded_len();
        if len > max_len {
            return Err(EncodeError::MessageTooLarge { len, max: max_len });
        }
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| EncodeError::OutOfMemory(len))?;
        self.encode_into(&mut out);
        Ok(out)
    }

    /// Decode a container that must already be canonical.
    ///
    /// Framing errors, duplicates and out-of-order siblings are all rejected:
    /// accepting them would make the set's encoding differ from the bytes the
    /// sender hashed.
    pub fn from_canonical(buf: &[u8]) -> Result<Self, TlvError> {
        Self::from_iter_canonical(tlvs(buf))
    }

    /// As [`TlvSet::from_canonical`], over an already positioned iterator.
    pub fn from_iter_canonical(iter: TlvIter<'_>) -> Result<Self, TlvError> {
        let mut set = Self::new();
        let mut last: Option<&[u8]> = None;
        for item in iter {
            let record = item?;
            if let Some(prev) = last {
                if prev >= record.raw() {
                    return Err(TlvError::OrderingViolation {
                        offset: record.offset(),
                    });
                }
            }
            last = Some(record.raw());
            set.records.insert(record.to_tlv());
        }
        Ok(set)
    }
}

impl FromIterator<Tlv> for TlvSet {
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<Tlv> for TlvSet {
    fn extend<I: IntoIterator<Item = Tlv>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl<'a> IntoIterator for &'a TlvSet {
    type Item = &'a Tlv;
    type IntoIter = std::collections::btree_set::Iter<'a, Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Check the ordering invariant of a buffer, recursing into containers.
///
/// `container_header` returns, for a record type, the length of the fixed
/// header preceding its nested records, or `None` if the type carries no
/// nested records.
pub fn verify_canonical(
    buf: &[u8],
    container_header: &dyn Fn(u16) -> Option<usize>,
) -> Result<(), TlvError> {
    verify_iter(tlvs(buf), container_header)
}

fn verify_iter(
    iter: TlvIter<'_>,
    container_header: &dyn Fn(u16) -> Option<usize>,
) -> Result<(), TlvError> {
    let mut last: Option<&[u8]> = None;
    for item in iter {
        let record = item?;
        if let Some(prev) = last {
            if prev >= record.raw() {
                return Err(TlvError::OrderingViolation {
                    offset: record.offset(),
                });
            }
        }
        last = Some(record.raw());

        if let Some(header_len) = container_header(record.ty()) {
            verify_iter(record.children_after(header_len)?, container_header)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_containers(_: u16) -> Option<usize> {
        None
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut set = TlvSet::new();
        set.insert(Tlv::new(44, b"zz").unwrap());
        set.insert(Tlv::new(8, b"b").unwrap());
        set.insert(Tlv::new(8, b"a").unwrap());

        let types: Vec<_> = set.iter().map(|t| (t.ty(), t.payload().to_vec())).collect();
        assert_eq!(
            types,
            vec![(8, b"a".to_vec()), (8, b"b".to_vec()), (44, b"zz".to_vec())]
        );
        assert!(verify_canonical(&set.to_bytes(), &no_containers).is_ok());
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut set = TlvSet::new();
        assert!(set.insert(Tlv::new(1, b"x").unwrap()));
        assert!(!set.insert(Tlv::new(1, b"x").unwrap()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_out_of_order_detected() {
        let mut buf = Tlv::new(9, b"").unwrap().as_bytes().to_vec();
        buf.extend_from_slice(Tlv::new(3, b"").unwrap().as_bytes());

        assert_eq!(
            verify_canonical(&buf, &no_containers),
            Err(TlvError::OrderingViolation { offset: 4 })
        );
        assert_eq!(
            TlvSet::from_canonical(&buf),
            Err(TlvError::OrderingViolation { offset: 4 })
        );
    }

    #[test]
    fn test_duplicate_sibling_is_violation() {
        let one = Tlv::new(5, b"same").unwrap();
        let mut buf = one.as_bytes().to_vec();
        buf.extend_from_slice(one.as_bytes());
        assert!(verify_canonical(&buf, &no_containers).is_err());
    }

    #[test]
    fn test_nested_violation_detected() {
        let mut inner = Tlv::new(9, b"").unwrap().as_bytes().to_vec();
        inner.extend_from_slice(Tlv::new(3, b"").unwrap().as_bytes());
        let outer = Tlv::new(6, &inner).unwrap();

        assert!(verify_canonical(outer.as_bytes(), &no_containers).is_ok());
        let containers = |ty: u16| if ty == 6 { Some(0) } else { None };
        assert_eq!(
            verify_canonical(outer.as_bytes(), &containers),
            Err(TlvError::OrderingViolation { offset: 8 })
        );
    }

    #[test]
    fn test_encode_bounded() {
        let set: TlvSet = (0..10u16).map(|i| Tlv::new(i, b"abcd").unwrap()).collect();
        assert_eq!(set.encode_bounded(80).unwrap().len(), 80);
        assert_eq!(
            set.encode_bounded(79),
            Err(EncodeError::MessageTooLarge { len: 80, max: 79 })
        );
    }

    #[test]
    fn test_from_canonical_roundtrip() {
        let set: TlvSet = [
            Tlv::new(1, b"one").unwrap(),
            Tlv::new(2, b"two").unwrap(),
            Tlv::new(2, b"two!").unwrap(),
        ]
        .into_iter()
        .collect();
        let bytes = set.to_bytes();
        let decoded = TlvSet::from_canonical(&bytes).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.to_bytes(), bytes);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_tlv() -> impl Strategy<Value = Tlv> {
            (0u16..64, proptest::collection::vec(any::<u8>(), 0..24))
                .prop_map(|(ty, payload)| Tlv::new(ty, &payload).unwrap())
        }

        proptest! {
            #[test]
            fn reencode_is_identical(records in proptest::collection::vec(arb_tlv(), 0..16)) {
                let set: TlvSet = records.into_iter().collect();
                let bytes = set.to_bytes();
                let decoded = TlvSet::from_canonical(&bytes).unwrap();
                prop_assert_eq!(decoded.to_bytes(), bytes);
            }

            #[test]
            fn siblings_strictly_ascending(records in proptest::collection::vec(arb_tlv(), 0..16)) {
                let set: TlvSet = records.into_iter().collect();
                let bytes = set.to_bytes();
                let raws: Vec<&[u8]> = tlvs(&bytes).map(|r| r.unwrap().raw()).collect();
                prop_assert!(raws.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(verify_canonical(&bytes, &no_containers).is_ok());
            }
        }
    }
}
