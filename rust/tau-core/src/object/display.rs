//! Canonical stringification, used for printing, interpolation and
//! diagnostics.

use crate::gc::Gc;
use crate::object::{List, Object};
use std::fmt;
use std::sync::Arc;

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => f.write_str("null"),
            Object::Bool(b) => write!(f, "{b}"),
            Object::Int(i) => write!(f, "{i}"),
            Object::Float(x) => write!(f, "{x:.6}"),
            Object::Builtin(_) => f.write_str("<builtin function>"),
            Object::String(s) | Object::Error(s) => {
                f.write_str(&String::from_utf8_lossy(s.as_slice()))
            }
            Object::List(l) => write_list(f, l, &mut Vec::new()),
            Object::Bytes(b) => {
                f.write_str("[")?;
                for (i, byte) in b.as_slice().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{byte}")?;
                }
                f.write_str("]")
            }
            // Opaque placeholders, not meant to be parsed back.
            Object::Map(m) => write!(f, "map[{:p}]", Arc::as_ptr(m)),
            Object::Namespace(o) => write!(f, "object[{:p}]", Arc::as_ptr(o)),
            Object::Function(func) => write!(f, "closure[{:p}]", Arc::as_ptr(func)),
            Object::Closure(c) => write!(f, "closure[{:p}]", Arc::as_ptr(&c.func)),
            Object::Pipe(_) => f.write_str("<pipe>"),
            Object::GetSetter(gs) => write!(f, "{}", gs.get()),
            Object::Native(_) => f.write_str("<native>"),
        }
    }
}

/// Write a list, rendering `[...]` for a list already being written
/// further up. Slices are identified by their owner.
fn write_list(
    f: &mut fmt::Formatter<'_>,
    list: &Gc<List>,
    open: &mut Vec<*const ()>,
) -> fmt::Result {
    let id = Arc::as_ptr(list.owner().unwrap_or(list)) as *const ();
    if open.contains(&id) {
        return f.write_str("[...]");
    }
    open.push(id);
    f.write_str("[")?;
    for (i, item) in list.to_vec().iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        match item {
            Object::List(inner) => write_list(f, inner, open)?,
            other => write!(f, "{other}")?,
        }
    }
    open.pop();
    f.write_str("]")
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::String(s) => write!(f, "{s:?}"),
            Object::Error(s) => write!(f, "Error({s:?})"),
            other => write!(f, "{}({other})", other.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Map, Native, Pipe};

    #[test]
    fn test_value_kinds() {
        assert_eq!(Object::Null.to_string(), "null");
        assert_eq!(Object::Bool(true).to_string(), "true");
        assert_eq!(Object::Bool(false).to_string(), "false");
        assert_eq!(Object::Int(-42).to_string(), "-42");
        assert_eq!(Object::Float(1.5).to_string(), "1.500000");
    }

    #[test]
    fn test_strings_render_raw() {
        assert_eq!(Object::string("hi there").to_string(), "hi there");
        assert_eq!(Object::error("boom").to_string(), "boom");
    }

    #[test]
    fn test_containers_render_recursively() {
        let l = Object::list(vec![
            Object::Int(1),
            Object::string("a"),
            Object::list(vec![Object::Null]),
        ]);
        assert_eq!(l.to_string(), "[1, a, [null]]");
        assert_eq!(Object::list(vec![]).to_string(), "[]");
        assert_eq!(Object::bytes(vec![1u8, 2, 255]).to_string(), "[1, 2, 255]");
    }

    #[test]
    fn test_self_containing_list_renders_marker() {
        let l = Object::list(vec![Object::Int(1), Object::Null]);
        let Object::List(inner) = &l else { unreachable!() };
        inner.set(1, l.clone());
        assert_eq!(l.to_string(), "[1, [...]]");
        // Break the cycle so the test does not leak.
        inner.set(1, Object::Null);
    }

    #[test]
    fn test_shared_sibling_is_not_a_cycle() {
        let shared = Object::list(vec![Object::Int(0)]);
        let l = Object::list(vec![shared.clone(), shared]);
        assert_eq!(l.to_string(), "[[0], [0]]");
    }

    #[test]
    fn test_opaque_kinds() {
        assert!(Object::map(Map::new()).to_string().starts_with("map["));
        assert!(Object::namespace().to_string().starts_with("object["));
        assert_eq!(Object::pipe(Pipe::unbuffered()).to_string(), "<pipe>");
        assert_eq!(Object::native(Native::Pointer(1)).to_string(), "<native>");
    }
}
