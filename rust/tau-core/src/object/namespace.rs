//! User-defined composite objects and modules.

use crate::gc::alloc;
use crate::object::{fnv64a, Object};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

/// Field table keyed by the FNV-1a hash of the field name.
#[derive(Default)]
pub struct Namespace {
    fields: RwLock<BTreeMap<u64, (String, Object)>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        self.fields
            .read()
            .get(&fnv64a(name.as_bytes()))
            .map(|(_, v)| v.clone())
    }

    /// Set `name` to `value` and return the value.
    pub fn set(&self, name: &str, value: Object) -> Object {
        self.fields
            .write()
            .insert(fnv64a(name.as_bytes()), (name.to_string(), value.clone()));
        value
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.read().values().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of this namespace holding only exported fields (names starting
    /// with an uppercase letter). Nested objects are filtered the same way.
    pub fn to_module(&self) -> Object {
        let mut visiting = Vec::new();
        self.to_module_inner(&mut visiting)
    }

    fn to_module_inner(&self, visiting: &mut Vec<*const Namespace>) -> Object {
        visiting.push(self as *const Namespace);
        let module = Namespace::new();
        let entries: Vec<(String, Object)> = self.fields.read().values().cloned().collect();
        for (name, value) in entries {
            if !is_exported(&name) {
                continue;
            }
            let value = match value {
                Object::Namespace(inner) if !visiting.contains(&(&**inner as *const Namespace)) => {
                    inner.to_module_inner(visiting)
                }
                other => other,
            };
            module.set(&name, value);
        }
        visiting.pop();
        Object::Namespace(alloc(module))
    }

    pub(crate) fn values(&self) -> Vec<Object> {
        self.fields.read().values().map(|(_, v)| v.clone()).collect()
    }

    pub(crate) fn clear(&self) {
        self.fields.write().clear();
    }
}

/// Whether a global or field name is visible to importers.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_value_and_get_reads_it() {
        let ns = Namespace::new();
        let v = ns.set("x", Object::Int(4));
        assert!(matches!(v, Object::Int(4)));
        assert!(matches!(ns.get("x"), Some(Object::Int(4))));
        assert!(ns.get("y").is_none());
    }

    #[test]
    fn test_to_module_keeps_exported_fields() {
        let ns = Namespace::new();
        ns.set("Public", Object::Int(1));
        ns.set("private", Object::Int(2));
        let Object::Namespace(module) = ns.to_module() else {
            panic!("expected object");
        };
        assert_eq!(module.names(), vec!["Public".to_string()]);
    }

    #[test]
    fn test_to_module_filters_nested_objects() {
        let inner = Object::namespace();
        if let Object::Namespace(n) = &inner {
            n.set("Keep", Object::Int(1));
            n.set("drop", Object::Int(2));
        }
        let outer = Namespace::new();
        outer.set("Inner", inner);
        let Object::Namespace(module) = outer.to_module() else {
            panic!("expected object");
        };
        let Some(Object::Namespace(nested)) = module.get("Inner") else {
            panic!("expected nested object");
        };
        assert_eq!(nested.len(), 1);
        assert!(nested.get("Keep").is_some());
    }

    #[test]
    fn test_to_module_survives_self_reference() {
        let obj = Object::namespace();
        if let Object::Namespace(n) = &obj {
            n.set("Me", obj.clone());
            let Object::Namespace(module) = n.to_module() else {
                panic!("expected object");
            };
            assert!(module.get("Me").is_some());
            n.clear();
        }
    }

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Foo"));
        assert!(!is_exported("foo"));
        assert!(!is_exported("_Foo"));
        assert!(!is_exported(""));
    }
}
