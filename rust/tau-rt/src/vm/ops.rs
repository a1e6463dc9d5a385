//! Operators, indexing, attribute access and literal construction.

use super::*;
use tau_core::gc::alloc;
use tau_core::object::{GetSetter, Map};

pub(super) fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub | Opcode::Minus => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "%",
        Opcode::BwAnd => "&",
        Opcode::BwOr => "|",
        Opcode::BwXor => "^",
        Opcode::BwLShift => "<<",
        Opcode::BwRShift => ">>",
        Opcode::BwNot => "~",
        Opcode::GreaterThan => ">",
        Opcode::GreaterThanEqual => ">=",
        Opcode::Bang => "!",
        Opcode::And => "&&",
        Opcode::Or => "||",
        _ => op.name(),
    }
}

fn as_f64(o: &Object) -> Option<f64> {
    match o {
        Object::Int(i) => Some(*i as f64),
        Object::Float(f) => Some(*f),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Binary and unary operators
// ---------------------------------------------------------------------------

/// Apply a binary operator. Operands are never modified; a result object is
/// always fresh. Integer arithmetic wraps.
pub(super) fn binary(op: Opcode, left: &Object, right: &Object) -> Result<Object, VmError> {
    let unsupported = || VmError::UnsupportedOperator {
        op: symbol(op),
        left: left.type_name(),
        right: right.type_name(),
    };

    if let (Object::Int(a), Object::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        return Ok(match op {
            Opcode::Add => Object::Int(a.wrapping_add(b)),
            Opcode::Sub => Object::Int(a.wrapping_sub(b)),
            Opcode::Mul => Object::Int(a.wrapping_mul(b)),
            Opcode::Div => Object::Float(a as f64 / b as f64),
            Opcode::Mod => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Object::Int(a.wrapping_rem(b))
            }
            Opcode::BwAnd => Object::Int(a & b),
            Opcode::BwOr => Object::Int(a | b),
            Opcode::BwXor => Object::Int(a ^ b),
            Opcode::BwLShift => Object::Int(a.wrapping_shl(b as u32)),
            Opcode::BwRShift => Object::Int(a.wrapping_shr(b as u32)),
            Opcode::GreaterThan => Object::Bool(a > b),
            Opcode::GreaterThanEqual => Object::Bool(a >= b),
            _ => return Err(unsupported()),
        });
    }

    if let (Object::String(a), Object::String(b)) = (left, right) {
        return match op {
            Opcode::Add => {
                let mut out = Vec::with_capacity(a.len() + b.len());
                out.extend_from_slice(a.as_slice());
                out.extend_from_slice(b.as_slice());
                Ok(Object::string(out))
            }
            Opcode::GreaterThan => Ok(Object::Bool(a.as_slice() > b.as_slice())),
            Opcode::GreaterThanEqual => Ok(Object::Bool(a.as_slice() >= b.as_slice())),
            _ => Err(unsupported()),
        };
    }

    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => match op {
            Opcode::Add => Ok(Object::Float(a + b)),
            Opcode::Sub => Ok(Object::Float(a - b)),
            Opcode::Mul => Ok(Object::Float(a * b)),
            Opcode::Div => Ok(Object::Float(a / b)),
            Opcode::GreaterThan => Ok(Object::Bool(a > b)),
            Opcode::GreaterThanEqual => Ok(Object::Bool(a >= b)),
            _ => Err(unsupported()),
        },
        _ => Err(unsupported()),
    }
}

pub(super) fn unary(op: Opcode, operand: &Object) -> Result<Object, VmError> {
    match (op, operand) {
        (Opcode::Minus, Object::Int(i)) => Ok(Object::Int(i.wrapping_neg())),
        (Opcode::Minus, Object::Float(f)) => Ok(Object::Float(-f)),
        (Opcode::BwNot, Object::Int(i)) => Ok(Object::Int(!i)),
        (Opcode::Bang, Object::Bool(b)) => Ok(Object::Bool(!b)),
        (Opcode::Bang, Object::Null) => Ok(Object::Bool(true)),
        (Opcode::Bang, _) => Ok(Object::Bool(false)),
        _ => Err(VmError::UnsupportedUnary {
            op: symbol(op),
            operand: operand.type_name(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Indexing and attributes
// ---------------------------------------------------------------------------

/// Resolve `left[index]`. Lists and maps yield getsetters so the result can
/// be assigned; indexing a string yields a one-byte string.
pub(super) fn index(left: &Object, index: &Object) -> Result<Object, VmError> {
    match (left, index) {
        (Object::List(list), Object::Int(i)) => Ok(Object::getsetter(GetSetter::ListIndex {
            list: list.clone(),
            index: *i,
        })),
        (Object::String(s), Object::Int(i)) => {
            let byte = usize::try_from(*i)
                .ok()
                .and_then(|i| s.as_slice().get(i).copied());
            Ok(match byte {
                Some(b) => Object::string(vec![b]),
                None => Object::error("index out of range"),
            })
        }
        (
            Object::Map(map),
            Object::Int(_) | Object::Float(_) | Object::String(_) | Object::Bool(_),
        ) => Ok(Object::getsetter(GetSetter::MapKey {
            map: map.clone(),
            key: index.clone(),
        })),
        _ => Err(VmError::InvalidIndex {
            left: left.type_name(),
            index: index.type_name(),
        }),
    }
}

/// Resolve `left.name`.
pub(super) fn dot(left: &Object, name: &Object) -> Result<Object, VmError> {
    let Object::String(name) = name else {
        return Err(VmError::NoAttribute {
            kind: left.type_name(),
            name: name.to_string(),
        });
    };
    let name = name.to_string_lossy();
    match left {
        Object::Namespace(ns) => Ok(Object::getsetter(GetSetter::Field {
            object: ns.clone(),
            name,
        })),
        Object::Native(lib) => Ok(Object::getsetter(GetSetter::NativeSymbol {
            library: lib.clone(),
            name,
        })),
        _ => Err(VmError::NoAttribute {
            kind: left.type_name(),
            name,
        }),
    }
}

/// Build a map from alternating keys and values.
pub(super) fn build_map(items: Vec<Object>) -> Result<Object, VmError> {
    let map = Map::new();
    let mut it = items.into_iter();
    while let (Some(key), Some(value)) = (it.next(), it.next()) {
        match key {
            Object::Int(_)
            | Object::Float(_)
            | Object::Bool(_)
            | Object::String(_)
            | Object::Error(_) => {
                map.set(key, value);
            }
            other => return Err(VmError::InvalidMapKey(other.type_name())),
        }
    }
    Ok(Object::Map(alloc(map)))
}

// ---------------------------------------------------------------------------
// Closures and interpolation
// ---------------------------------------------------------------------------

impl Vm {
    /// Wrap the function constant at `idx` with the top `nfree` stack values.
    pub(super) fn push_closure(&mut self, idx: usize, nfree: usize) -> Result<(), VmError> {
        let func = match self.constant(idx)? {
            Object::Function(func) => func,
            other => return Err(VmError::NotAFunction(format!("{other:?}"))),
        };
        let free = self.pop_n(nfree)?;
        self.push_new(Object::closure(func, free))
    }

    /// Substitute the top `nargs` values, rendered as strings, for the
    /// placeholder bytes of the string constant at `idx`.
    pub(super) fn interpolate(&mut self, idx: usize, nargs: usize) -> Result<(), VmError> {
        let format = self.constant(idx)?;
        let Object::String(format) = format else {
            return Err(VmError::InvalidFormat(format.type_name()));
        };
        let args = self.pop_n(nargs)?;
        let mut subs = args.iter();
        let mut out = Vec::with_capacity(format.len());
        for &b in format.as_slice() {
            if b == PLACEHOLDER {
                if let Some(arg) = subs.next() {
                    out.extend_from_slice(arg.to_string().as_bytes());
                }
            } else {
                out.push(b);
            }
        }
        self.push_new(Object::string(out))
    }
}

/// Placeholder byte in interpolation formats. It never occurs in UTF-8 text.
const PLACEHOLDER: u8 = 0xff;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: Opcode, l: Object, r: Object) -> Result<Object, VmError> {
        binary(op, &l, &r)
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        let r = bin(Opcode::Add, Object::Int(i64::MAX), Object::Int(1)).unwrap();
        assert!(r.equals(&Object::Int(i64::MIN)));
        let r = bin(Opcode::Mul, Object::Int(6), Object::Int(7)).unwrap();
        assert!(r.equals(&Object::Int(42)));
    }

    #[test]
    fn test_division_is_float() {
        let r = bin(Opcode::Div, Object::Int(7), Object::Int(2)).unwrap();
        assert!(matches!(r, Object::Float(f) if f == 3.5));
        let r = bin(Opcode::Div, Object::Int(1), Object::Int(0)).unwrap();
        assert!(matches!(r, Object::Float(f) if f.is_infinite()));
    }

    #[test]
    fn test_modulo_by_zero() {
        assert_eq!(
            bin(Opcode::Mod, Object::Int(1), Object::Int(0)).unwrap_err(),
            VmError::DivisionByZero
        );
        assert!(bin(Opcode::Mod, Object::Int(-7), Object::Int(3))
            .unwrap()
            .equals(&Object::Int(-1)));
    }

    #[test]
    fn test_mixed_numeric_promotes_to_float() {
        let r = bin(Opcode::Sub, Object::Float(1.5), Object::Int(1)).unwrap();
        assert!(matches!(r, Object::Float(f) if f == 0.5));
        let r = bin(Opcode::GreaterThan, Object::Int(2), Object::Float(1.5)).unwrap();
        assert!(r.equals(&Object::Bool(true)));
    }

    #[test]
    fn test_string_concat_leaves_operands() {
        let a = Object::string("foo");
        let b = Object::string("bar");
        let r = binary(Opcode::Add, &a, &b).unwrap();
        assert_eq!(r.to_string(), "foobar");
        assert_eq!(a.to_string(), "foo");
        assert_eq!(b.to_string(), "bar");
    }

    #[test]
    fn test_string_ordering_is_bytewise() {
        let r = bin(Opcode::GreaterThan, Object::string("b"), Object::string("abc")).unwrap();
        assert!(r.equals(&Object::Bool(true)));
    }

    #[test]
    fn test_mismatched_operands_name_both_types() {
        let err = bin(Opcode::Add, Object::Int(1), Object::string("a")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operator '+' for types int and string");
        let err = bin(Opcode::Add, Object::string("a"), Object::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operator '+' for types string and int");
        let err = bin(Opcode::BwAnd, Object::Float(1.0), Object::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operator '&' for types float and int");
    }

    #[test]
    fn test_unary() {
        assert!(unary(Opcode::Minus, &Object::Int(3)).unwrap().equals(&Object::Int(-3)));
        assert!(unary(Opcode::BwNot, &Object::Int(0)).unwrap().equals(&Object::Int(-1)));
        assert!(unary(Opcode::Bang, &Object::Null).unwrap().equals(&Object::Bool(true)));
        assert!(unary(Opcode::Bang, &Object::Int(0)).unwrap().equals(&Object::Bool(false)));
        let err = unary(Opcode::Minus, &Object::string("x")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operator '-' for type string");
    }

    #[test]
    fn test_string_index() {
        let s = Object::string("abc");
        assert_eq!(index(&s, &Object::Int(1)).unwrap().to_string(), "b");
        let oob = index(&s, &Object::Int(3)).unwrap();
        assert!(oob.is_error());
        assert_eq!(oob.to_string(), "index out of range");
    }

    #[test]
    fn test_invalid_index() {
        let err = index(&Object::Int(1), &Object::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "invalid index operator for types int and int");
        let err = index(&Object::map(Map::new()), &Object::list(vec![])).unwrap_err();
        assert!(matches!(err, VmError::InvalidIndex { .. }));
    }

    #[test]
    fn test_dot_on_non_object() {
        let err = dot(&Object::Int(1), &Object::string("x")).unwrap_err();
        assert_eq!(err.to_string(), "int object has no attribute x");
    }

    #[test]
    fn test_build_map_rejects_list_key() {
        let err = build_map(vec![Object::list(vec![]), Object::Int(1)]).unwrap_err();
        assert_eq!(err, VmError::InvalidMapKey("list"));
    }
}
