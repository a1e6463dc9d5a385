//! Maps keyed by (type tag, 64-bit hash) pairs.

use crate::object::{Object, ObjectType};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// 64-bit FNV-1a. The prime multiplication is spelled as the shift-add
/// sequence `h += h<<1 + h<<4 + h<<5 + h<<7 + h<<8 + h<<40`.
pub fn fnv64a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash
            .wrapping_add(hash << 1)
            .wrapping_add(hash << 4)
            .wrapping_add(hash << 5)
            .wrapping_add(hash << 7)
            .wrapping_add(hash << 8)
            .wrapping_add(hash << 40);
    }
    hash
}

/// Map key: the key's type tag plus a 64-bit hash of its value.
///
/// Integers and booleans hash to their value, floats to their bit pattern,
/// strings and errors to the FNV-1a hash of their bytes. Two keys that
/// collide are the same key (last write wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapKey {
    pub tag: ObjectType,
    pub hash: u64,
}

impl MapKey {
    /// Key for `o`, or `None` if the kind cannot be used as a map key.
    pub fn of(o: &Object) -> Option<MapKey> {
        let hash = match o {
            Object::Int(i) => *i as u64,
            Object::Bool(b) => u64::from(*b),
            Object::Float(f) => f.to_bits(),
            Object::String(s) | Object::Error(s) => fnv64a(s.as_slice()),
            _ => return None,
        };
        Some(MapKey {
            tag: o.object_type(),
            hash,
        })
    }
}

/// A map from hashable objects to objects. Entries keep the original key
/// object next to the value so `keys` can return it.
#[derive(Default)]
pub struct Map {
    entries: RwLock<BTreeMap<MapKey, (Object, Object)>>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, `None` if absent or `key` is not hashable.
    pub fn get(&self, key: &Object) -> Option<Object> {
        let k = MapKey::of(key)?;
        self.entries.read().get(&k).map(|(_, v)| v.clone())
    }

    /// The stored (key, value) pair, or the null pair when absent.
    pub fn pair(&self, key: &Object) -> (Object, Object) {
        MapKey::of(key)
            .and_then(|k| self.entries.read().get(&k).cloned())
            .unwrap_or((Object::Null, Object::Null))
    }

    /// Store `value` under `key`. Returns `false` if the key kind is not
    /// hashable; nothing is stored in that case.
    pub fn set(&self, key: Object, value: Object) -> bool {
        match MapKey::of(&key) {
            Some(k) => {
                self.entries.write().insert(k, (key, value));
                true
            }
            None => false,
        }
    }

    /// Remove `key`, returning the removed value.
    pub fn delete(&self, key: &Object) -> Option<Object> {
        let k = MapKey::of(key)?;
        self.entries.write().remove(&k).map(|(_, v)| v)
    }

    pub fn keys(&self) -> Vec<Object> {
        self.entries.read().values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Object> {
        self.entries.read().values().map(|(_, v)| v.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(Object, Object)> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Map(len={})", self.len())
    }
}
