//! Lists and list slices.

use crate::gc::Gc;
use crate::object::Object;
use parking_lot::RwLock;
use std::fmt;

/// A list of objects, either owning its elements or slicing another list.
///
/// Lists never grow in place (`append` builds a new list), so a slice's
/// window into its owner stays valid for the owner's whole life. Writes
/// through a slice land in the owner.
pub struct List {
    storage: Storage,
}

enum Storage {
    Owned(RwLock<Vec<Object>>),
    Slice {
        owner: Gc<List>,
        start: usize,
        len: usize,
    },
}

impl List {
    pub fn new(items: Vec<Object>) -> Self {
        Self {
            storage: Storage::Owned(RwLock::new(items)),
        }
    }

    /// Create a slice of `list` over `start..end`, re-targeted at the
    /// ultimate owner. Returns `None` if the range is out of bounds.
    pub fn slice(list: &Gc<List>, start: usize, end: usize) -> Option<List> {
        if start > end || end > list.len() {
            return None;
        }
        let (owner, base) = match &list.storage {
            Storage::Owned(_) => (list.clone(), 0),
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

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(items) => items.read().len(),
            Storage::Slice { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Object> {
        match &self.storage {
            Storage::Owned(items) => items.read().get(index).cloned(),
            Storage::Slice { owner, start, len } => {
                if index < *len {
                    owner.get(start + index)
                } else {
                    None
                }
            }
        }
    }

    /// Replace the element at `index`. Returns `false` when out of range.
    pub fn set(&self, index: usize, value: Object) -> bool {
        match &self.storage {
            Storage::Owned(items) => match items.write().get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            Storage::Slice { owner, start, len } => index < *len && owner.set(start + index, value),
        }
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Object> {
        match &self.storage {
            Storage::Owned(items) => items.read().clone(),
            Storage::Slice { owner, start, len } => (*start..*start + *len)
                .filter_map(|i| owner.get(i))
                .collect(),
        }
    }

    /// The owning list if this is a slice.
    pub fn owner(&self) -> Option<&Gc<List>> {
        match &self.storage {
            Storage::Owned(_) => None,
            Storage::Slice { owner, .. } => Some(owner),
        }
    }

    pub fn is_slice(&self) -> bool {
        self.owner().is_some()
    }

    /// Drop every element held by an owning list. Slices hold no elements
    /// of their own and are left untouched.
    pub(crate) fn clear(&self) {
        if let Storage::Owned(items) = &self.storage {
            items.write().clear();
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List(len={}, slice={})", self.len(), self.is_slice())
    }
}
