//! Deferred read/write handles produced by indexing and field access.

use crate::gc::Gc;
use crate::object::{List, Map, Namespace, Native, Object};

/// A (container, key) pair whose read or write is deferred to the next
/// instruction. Reads and writes that fail yield error values.
#[derive(Debug)]
pub enum GetSetter {
    ListIndex { list: Gc<List>, index: i64 },
    MapKey { map: Gc<Map>, key: Object },
    Field { object: Gc<Namespace>, name: String },
    NativeSymbol { library: Gc<Native>, name: String },
}

impl GetSetter {
    pub fn get(&self) -> Object {
        match self {
            GetSetter::ListIndex { list, index } => {
                match usize::try_from(*index).ok().and_then(|i| list.get(i)) {
                    Some(v) => v,
                    None => Object::error("index out of range"),
                }
            }
            GetSetter::MapKey { map, key } => map.pair(key).1,
            GetSetter::Field { object, name } => object.get(name).unwrap_or(Object::Null),
            GetSetter::NativeSymbol { library, name } => match library.symbol(name) {
                Ok(sym) => Object::native(sym),
                Err(e) => Object::error(e.to_string()),
            },
        }
    }

    /// Write `value` into the referenced slot and return it. Values stored
    /// into a shared container become shared themselves.
    pub fn set(&self, value: Object) -> Object {
        match self {
            GetSetter::ListIndex { list, index } => {
                // A slice writes into its owner, so the owner decides.
                let target = list.owner().unwrap_or(list);
                if list.header().is_shared() || target.header().is_shared() {
                    value.share();
                }
                match usize::try_from(*index) {
                    Ok(i) if list.set(i, value.clone()) => value,
                    _ => Object::error("index out of range"),
                }
            }
            GetSetter::MapKey { map, key } => {
                if map.header().is_shared() {
                    value.share();
                }
                if map.set(key.clone(), value.clone()) {
                    value
                } else {
                    Object::error(format!("invalid map key type {}", key.type_name()))
                }
            }
            GetSetter::Field { object, name } => {
                if object.header().is_shared() {
                    value.share();
                }
                object.set(name, value)
            }
            GetSetter::NativeSymbol { .. } => Object::error("cannot assign values to type native"),
        }
    }

    /// Objects held by this handle, for tracing.
    pub(crate) fn referents(&self) -> [Object; 2] {
        match self {
            GetSetter::ListIndex { list, .. } => [Object::List(list.clone()), Object::Null],
            GetSetter::MapKey { map, key } => [Object::Map(map.clone()), key.clone()],
            GetSetter::Field { object, .. } => [Object::Namespace(object.clone()), Object::Null],
            GetSetter::NativeSymbol { library, .. } => [Object::Native(library.clone()), Object::Null],
        }
    }
}
