//! Runtime object model.
//!
//! [`Object`] is a closed tagged union. Value kinds (null, booleans, integers,
//! floats, builtins) are stored inline and never tracked by the collector;
//! reference kinds live in [`HeapCell`](crate::gc::HeapCell)s and carry a
//! [`GcHeader`](crate::gc::GcHeader).

mod bytes;
mod display;
mod function;
mod getsetter;
mod list;
mod map;
mod namespace;
mod native;
mod pipe;
mod trace;

pub use bytes::ByteSeq;
pub use function::{Bookmark, Closure, Function};
pub use getsetter::GetSetter;
pub use list::List;
pub use map::{fnv64a, Map, MapKey};
pub use namespace::{is_exported, Namespace};
pub use native::{Native, NativeError};
pub use pipe::{Pipe, PipeError};

use crate::gc::{alloc, Gc, GcHeader};
use std::fmt;
use std::sync::Arc;

/// Signature shared by every host builtin: the argument window in, one
/// result out. Builtins report failures as error values, never by panicking.
pub type BuiltinFn = fn(&[Object]) -> Object;

/// A host builtin function as it appears on the operand stack.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn call(&self, args: &[Object]) -> Object {
        (self.func)(args)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

// ---------------------------------------------------------------------------
// Type tags
// ---------------------------------------------------------------------------

/// Discriminant of an [`Object`]. The numeric values are the tags used by
/// the bytecode format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Null = 0,
    Boolean = 1,
    Integer = 2,
    Float = 3,
    Builtin = 4,
    String = 5,
    Error = 6,
    List = 7,
    Map = 8,
    Function = 9,
    Closure = 10,
    Object = 11,
    Pipe = 12,
    Bytes = 13,
    GetSetter = 14,
    Native = 15,
}

impl ObjectType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => ObjectType::Null,
            1 => ObjectType::Boolean,
            2 => ObjectType::Integer,
            3 => ObjectType::Float,
            4 => ObjectType::Builtin,
            5 => ObjectType::String,
            6 => ObjectType::Error,
            7 => ObjectType::List,
            8 => ObjectType::Map,
            9 => ObjectType::Function,
            10 => ObjectType::Closure,
            11 => ObjectType::Object,
            12 => ObjectType::Pipe,
            13 => ObjectType::Bytes,
            14 => ObjectType::GetSetter,
            15 => ObjectType::Native,
            _ => return None,
        })
    }

    /// Name used in diagnostics and returned by the `type` builtin.
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Null => "null",
            ObjectType::Boolean => "bool",
            ObjectType::Integer => "int",
            ObjectType::Float => "float",
            ObjectType::Builtin => "builtin",
            ObjectType::String => "string",
            ObjectType::Error => "error",
            ObjectType::List => "list",
            ObjectType::Map => "map",
            ObjectType::Function => "function",
            ObjectType::Closure => "closure",
            ObjectType::Object => "object",
            ObjectType::Pipe => "pipe",
            ObjectType::Bytes => "bytes",
            ObjectType::GetSetter => "getsetter",
            ObjectType::Native => "native",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A runtime value.
#[derive(Clone)]
pub enum Object {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Builtin(Builtin),
    String(Gc<ByteSeq>),
    Error(Gc<ByteSeq>),
    List(Gc<List>),
    Map(Gc<Map>),
    Function(Arc<Function>),
    Closure(Gc<Closure>),
    /// A user-defined composite or an imported module.
    Namespace(Gc<Namespace>),
    Pipe(Gc<Pipe>),
    Bytes(Gc<ByteSeq>),
    /// Deferred read/write over a container slot; lives for one instruction.
    GetSetter(Arc<GetSetter>),
    Native(Gc<Native>),
}

impl Object {
    // --- Constructors ---

    pub fn string(s: impl Into<Vec<u8>>) -> Self {
        Object::String(alloc(ByteSeq::new(s.into())))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Object::Error(alloc(ByteSeq::new(msg.into().into_bytes())))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Object::Bytes(alloc(ByteSeq::new(b.into())))
    }

    pub fn list(items: Vec<Object>) -> Self {
        Object::List(alloc(List::new(items)))
    }

    pub fn map(map: Map) -> Self {
        Object::Map(alloc(map))
    }

    pub fn namespace() -> Self {
        Object::Namespace(alloc(Namespace::new()))
    }

    pub fn function(f: Function) -> Self {
        Object::Function(Arc::new(f))
    }

    pub fn closure(func: Arc<Function>, free: Vec<Object>) -> Self {
        Object::Closure(alloc(Closure::new(func, free)))
    }

    pub fn pipe(pipe: Pipe) -> Self {
        Object::Pipe(alloc(pipe))
    }

    pub fn native(native: Native) -> Self {
        Object::Native(alloc(native))
    }

    pub fn getsetter(gs: GetSetter) -> Self {
        Object::GetSetter(Arc::new(gs))
    }

    // --- Inspection ---

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Null => ObjectType::Null,
            Object::Bool(_) => ObjectType::Boolean,
            Object::Int(_) => ObjectType::Integer,
            Object::Float(_) => ObjectType::Float,
            Object::Builtin(_) => ObjectType::Builtin,
            Object::String(_) => ObjectType::String,
            Object::Error(_) => ObjectType::Error,
            Object::List(_) => ObjectType::List,
            Object::Map(_) => ObjectType::Map,
            Object::Function(_) => ObjectType::Function,
            Object::Closure(_) => ObjectType::Closure,
            Object::Namespace(_) => ObjectType::Object,
            Object::Pipe(_) => ObjectType::Pipe,
            Object::Bytes(_) => ObjectType::Bytes,
            Object::GetSetter(_) => ObjectType::GetSetter,
            Object::Native(_) => ObjectType::Native,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.object_type().name()
    }

    /// The GC header of a tracked reference object, if any.
    pub fn header(&self) -> Option<&GcHeader> {
        match self {
            Object::String(c) | Object::Error(c) | Object::Bytes(c) => Some(c.header()),
            Object::List(c) => Some(c.header()),
            Object::Map(c) => Some(c.header()),
            Object::Closure(c) => Some(c.header()),
            Object::Namespace(c) => Some(c.header()),
            Object::Pipe(c) => Some(c.header()),
            Object::Native(c) => Some(c.header()),
            Object::Null
            | Object::Bool(_)
            | Object::Int(_)
            | Object::Float(_)
            | Object::Builtin(_)
            | Object::Function(_)
            | Object::GetSetter(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Boolean by value, numbers by non-zero, `null` false, everything else true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Bool(b) => *b,
            Object::Int(i) => *i != 0,
            Object::Float(f) => *f != 0.0,
            Object::Null => false,
            _ => true,
        }
    }

    /// Resolve a getsetter to the value it refers to; any other object is
    /// returned as is.
    pub fn unwrap_getsetter(self) -> Object {
        match self {
            Object::GetSetter(gs) => gs.get(),
            other => other,
        }
    }

    /// Raw bytes of a string, error or bytes object.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) | Object::Error(s) | Object::Bytes(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    /// Value equality as performed by the `equal` opcode.
    ///
    /// Integers and floats compare numerically across kinds; strings, errors
    /// and bytes compare by content; other reference kinds by identity. A
    /// kind mismatch is never an error, only unequal.
    pub fn equals(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Bool(a), Object::Bool(b)) => a == b,
            (Object::Int(a), Object::Int(b)) => a == b,
            (Object::Float(a), Object::Float(b)) => a == b,
            (Object::Int(a), Object::Float(b)) => (*a as f64) == *b,
            (Object::Float(a), Object::Int(b)) => *a == (*b as f64),
            (Object::String(a), Object::String(b))
            | (Object::Error(a), Object::Error(b))
            | (Object::Bytes(a), Object::Bytes(b)) => {
                a.len() == b.len() && a.as_slice() == b.as_slice()
            }
            (Object::Builtin(a), Object::Builtin(b)) => a.name == b.name,
            (Object::List(a), Object::List(b)) => Arc::ptr_eq(a, b),
            (Object::Map(a), Object::Map(b)) => Arc::ptr_eq(a, b),
            (Object::Function(a), Object::Function(b)) => Arc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Arc::ptr_eq(a, b),
            (Object::Namespace(a), Object::Namespace(b)) => Arc::ptr_eq(a, b),
            (Object::Pipe(a), Object::Pipe(b)) => Arc::ptr_eq(a, b),
            (Object::Native(a), Object::Native(b)) => Arc::ptr_eq(a, b),
            (Object::GetSetter(a), Object::GetSetter(b)) => a.get().equals(&b.get()),
            _ => false,
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Bool(b)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Int(i)
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Object::Float(f)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::string(s)
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::Null
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_follow_tags() {
        for tag in 0..16u8 {
            let ty = ObjectType::from_u8(tag).unwrap();
            assert_eq!(ty as u8, tag);
        }
        assert!(ObjectType::from_u8(16).is_none());
        assert_eq!(Object::Int(1).type_name(), "int");
        assert_eq!(Object::Bool(true).type_name(), "bool");
        assert_eq!(Object::namespace().type_name(), "object");
        assert_eq!(Object::error("x").type_name(), "error");
    }

    #[test]
    fn test_truthiness() {
        assert!(Object::Bool(true).is_truthy());
        assert!(!Object::Bool(false).is_truthy());
        assert!(!Object::Int(0).is_truthy());
        assert!(Object::Int(-3).is_truthy());
        assert!(!Object::Float(0.0).is_truthy());
        assert!(Object::Float(0.5).is_truthy());
        assert!(!Object::Null.is_truthy());
        assert!(Object::string("").is_truthy());
        assert!(Object::list(vec![]).is_truthy());
    }

    #[test]
    fn test_equality_across_numeric_kinds() {
        assert!(Object::Int(2).equals(&Object::Float(2.0)));
        assert!(Object::Float(2.0).equals(&Object::Int(2)));
        assert!(!Object::Int(2).equals(&Object::Float(2.5)));
    }

    #[test]
    fn test_equality_of_mismatched_kinds_is_false() {
        assert!(!Object::Int(1).equals(&Object::string("1")));
        assert!(!Object::Null.equals(&Object::Bool(false)));
    }

    #[test]
    fn test_string_equality_by_content() {
        assert!(Object::string("abc").equals(&Object::string("abc")));
        assert!(!Object::string("abc").equals(&Object::string("abd")));
        assert!(!Object::string("ab").equals(&Object::string("abc")));
    }

    #[test]
    fn test_list_equality_by_identity() {
        let a = Object::list(vec![Object::Int(1)]);
        let b = Object::list(vec![Object::Int(1)]);
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_value_kinds_have_no_header() {
        assert!(Object::Int(1).header().is_none());
        assert!(Object::Null.header().is_none());
        assert!(Object::string("x").header().is_some());
    }
}
