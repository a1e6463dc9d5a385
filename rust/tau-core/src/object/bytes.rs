//! Immutable byte sequences backing strings, errors and bytes objects.

use crate::gc::{alloc, Gc};
use std::fmt;

/// Storage for string, error and bytes objects.
///
/// A sequence either owns its buffer or is a slice over the buffer of its
/// ultimate owner. Slices always point at an owning sequence, never at
/// another slice, so the owner is kept alive (and marked) for as long as any
/// slice over it is reachable.
pub struct ByteSeq {
    storage: Storage,
}

enum Storage {
    Owned(Box<[u8]>),
    Slice {
        owner: Gc<ByteSeq>,
        start: usize,
        len: usize,
    },
}

impl ByteSeq {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(bytes.into_boxed_slice()),
        }
    }

    /// Create a slice of `seq` over `start..end`, re-targeted at the ultimate
    /// owner. Returns `None` if the range is out of bounds.
    pub fn slice(seq: &Gc<ByteSeq>, start: usize, end: usize) -> Option<ByteSeq> {
        if start > end || end > seq.len() {
            return None;
        }
        let (owner, base) = match &seq.storage {
            Storage::Owned(_) => (seq.clone(), 0),
            Storage::Slice { owner, start, .. } => (owner.clone(), *start),
        };
        Some(Self {
            storage: Storage::Slice {
                owner,
                start: base + start,
                len: end - start,
            },
        })
    }

    /// A slice spanning all of `seq`.
    pub fn view(seq: &Gc<ByteSeq>) -> ByteSeq {
        let len = seq.len();
        match Self::slice(seq, 0, len) {
            Some(s) => s,
            None => Self::new(Vec::new()),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(b) => b,
            Storage::Slice { owner, start, len } => match &owner.storage {
                Storage::Owned(b) => &b[*start..*start + *len],
                // Owners are always owning sequences.
                Storage::Slice { .. } => &[],
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(b) => b.len(),
            Storage::Slice { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The owning sequence if this is a slice.
    pub fn owner(&self) -> Option<&Gc<ByteSeq>> {
        match &self.storage {
            Storage::Owned(_) => None,
            Storage::Slice { owner, .. } => Some(owner),
        }
    }

    pub fn is_slice(&self) -> bool {
        self.owner().is_some()
    }

    /// Lossy UTF-8 view used for diagnostics and stringification.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_slice()).into_owned()
    }

    /// Allocate an owned copy of `bytes`.
    pub fn alloc(bytes: &[u8]) -> Gc<ByteSeq> {
        alloc(Self::new(bytes.to_vec()))
    }
}

impl fmt::Debug for ByteSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_reads_owner_range() {
        let owner = ByteSeq::alloc(b"hello world");
        let s = ByteSeq::slice(&owner, 6, 11).unwrap();
        assert_eq!(s.as_slice(), b"world");
        assert_eq!(s.len(), 5);
        assert!(s.is_slice());
    }

    #[test]
    fn test_slice_of_slice_targets_ultimate_owner() {
        let owner = ByteSeq::alloc(b"abcdef");
        let first = alloc(ByteSeq::slice(&owner, 1, 5).unwrap());
        let second = ByteSeq::slice(&first, 1, 3).unwrap();
        assert_eq!(second.as_slice(), b"cd");
        assert!(std::sync::Arc::ptr_eq(second.owner().unwrap(), &owner));
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let owner = ByteSeq::alloc(b"abc");
        assert!(ByteSeq::slice(&owner, 0, 4).is_none());
        assert!(ByteSeq::slice(&owner, 2, 1).is_none());
    }

    #[test]
    fn test_slice_outlives_other_owner_handles() {
        let owner = ByteSeq::alloc(b"xyz");
        let s = ByteSeq::slice(&owner, 1, 3).unwrap();
        drop(owner);
        assert_eq!(s.as_slice(), b"yz");
    }
}
