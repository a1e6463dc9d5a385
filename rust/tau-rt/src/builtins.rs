//! Host builtins, addressed by index from `get_builtin`.
//!
//! Builtins receive the argument window and return one object. Misuse is
//! reported by returning an error value, never by aborting the unit.

use std::ffi::{c_char, CStr};
use std::io::{BufRead, Write};
use tau_core::gc::alloc;
use tau_core::object::{Builtin, ByteSeq, List, Native, Pipe};
use tau_core::Object;

/// The builtin table. The order is part of the bytecode contract.
pub static BUILTINS: [Builtin; 25] = [
    Builtin { name: "len", func: len },
    Builtin { name: "println", func: println },
    Builtin { name: "print", func: print },
    Builtin { name: "input", func: input },
    Builtin { name: "string", func: string },
    Builtin { name: "error", func: error },
    Builtin { name: "type", func: type_of },
    Builtin { name: "int", func: int },
    Builtin { name: "float", func: float },
    Builtin { name: "exit", func: exit },
    Builtin { name: "append", func: append },
    Builtin { name: "new", func: new },
    Builtin { name: "failed", func: failed },
    Builtin { name: "plugin", func: plugin },
    Builtin { name: "pipe", func: pipe },
    Builtin { name: "send", func: send },
    Builtin { name: "recv", func: recv },
    Builtin { name: "close", func: close },
    Builtin { name: "hex", func: hex },
    Builtin { name: "oct", func: oct },
    Builtin { name: "bin", func: bin },
    Builtin { name: "slice", func: slice },
    Builtin { name: "keys", func: keys },
    Builtin { name: "delete", func: delete },
    Builtin { name: "bytes", func: bytes },
];

/// Builtin at `index` in the table.
pub fn get(index: usize) -> Option<Builtin> {
    BUILTINS.get(index).copied()
}

/// Table index of the builtin called `name`.
pub fn index_of(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|b| b.name == name)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arity(name: &str, expected: impl std::fmt::Display, got: usize) -> Object {
    Object::error(format!(
        "{name}: wrong number of arguments, expected {expected}, got {got}"
    ))
}

fn wrong_type(name: &str, got: &Object) -> Object {
    Object::error(format!(
        "{name}: unsupported argument type {}",
        got.type_name()
    ))
}

fn expect_int(name: &str, what: &str, o: &Object) -> Result<i64, Object> {
    match o {
        Object::Int(i) => Ok(*i),
        other => Err(Object::error(format!(
            "{name}: {what} must be an int, got {}",
            other.type_name()
        ))),
    }
}

fn expect_pipe<'a>(name: &str, o: &'a Object) -> Result<&'a Pipe, Object> {
    match o {
        Object::Pipe(p) => Ok(p),
        other => Err(Object::error(format!(
            "{name}: first argument must be a pipe, got {}",
            other.type_name()
        ))),
    }
}

fn joined(args: &[Object]) -> String {
    args.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn native_word(n: &Native) -> Option<u64> {
    n.word().map(|w| w as u64)
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

fn len(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("len", 1, args.len());
    };
    let n = match arg {
        Object::List(l) => l.len(),
        Object::String(s) | Object::Error(s) | Object::Bytes(s) => s.len(),
        Object::Map(m) => m.len(),
        other => {
            return Object::error(format!(
                "len: object of type \"{}\" has no length",
                other.type_name()
            ))
        }
    };
    Object::Int(n as i64)
}

fn println(args: &[Object]) -> Object {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{}", joined(args));
    Object::Null
}

fn print(args: &[Object]) -> Object {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}", joined(args));
    let _ = out.flush();
    Object::Null
}

fn input(args: &[Object]) -> Object {
    match args {
        [] => {}
        [prompt] => {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{prompt}");
            let _ = out.flush();
        }
        _ => return arity("input", "0 or 1", args.len()),
    }
    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        return Object::error(format!("input: {e}"));
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Object::string(trimmed)
}

fn string(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("string", 1, args.len());
    };
    match arg {
        Object::String(_) => arg.clone(),
        Object::Native(n) => match n.word() {
            Some(0) | None => Object::error("string: null pointer"),
            Some(ptr) => {
                // SAFETY: the script asserts the native value points at a
                // NUL-terminated C string.
                let s = unsafe { CStr::from_ptr(ptr as *const c_char) };
                Object::string(s.to_bytes().to_vec())
            }
        },
        other => Object::string(other.to_string()),
    }
}

fn error(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("error", 1, args.len());
    };
    match arg {
        Object::String(s) => Object::Error(alloc(ByteSeq::view(s))),
        other => Object::error(other.to_string()),
    }
}

fn type_of(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("type", 1, args.len());
    };
    Object::string(arg.type_name())
}

fn int(args: &[Object]) -> Object {
    let (arg, bits) = match args {
        [arg] => (arg, 0),
        [arg, bits] => match expect_int("int", "second argument", bits) {
            Ok(b) => (arg, b),
            Err(e) => return e,
        },
        _ => return arity("int", "1 or 2", args.len()),
    };
    match arg {
        Object::Int(_) => arg.clone(),
        Object::Float(f) => Object::Int(*f as i64),
        Object::Bool(b) => Object::Int(i64::from(*b)),
        Object::String(s) => {
            let text = s.to_string_lossy();
            match text.trim().parse::<i64>() {
                Ok(i) => Object::Int(i),
                Err(_) => Object::error(format!("int: {text} is not a number")),
            }
        }
        Object::Native(n) => {
            let Some(w) = native_word(n) else {
                return Object::error("int: native library has no value");
            };
            match bits {
                0 | 32 => Object::Int(i64::from(w as i32)),
                8 => Object::Int(i64::from(w as i8)),
                16 => Object::Int(i64::from(w as i16)),
                64 => Object::Int(w as i64),
                other => Object::error(format!("int: unsupported bit size {other}")),
            }
        }
        other => wrong_type("int", other),
    }
}

fn float(args: &[Object]) -> Object {
    let (arg, bits) = match args {
        [arg] => (arg, 0),
        [arg, bits] => match expect_int("float", "second argument", bits) {
            Ok(b) => (arg, b),
            Err(e) => return e,
        },
        _ => return arity("float", "1 or 2", args.len()),
    };
    match arg {
        Object::Float(_) => arg.clone(),
        Object::Int(i) => Object::Float(*i as f64),
        Object::String(s) => {
            let text = s.to_string_lossy();
            match text.trim().parse::<f64>() {
                Ok(f) => Object::Float(f),
                Err(_) => Object::error(format!("float: {text} is not a number")),
            }
        }
        Object::Native(n) => {
            let Some(w) = native_word(n) else {
                return Object::error("float: native library has no value");
            };
            match bits {
                0 | 32 => Object::Float(f64::from(f32::from_bits(w as u32))),
                64 => Object::Float(f64::from_bits(w)),
                other => Object::error(format!("float: unsupported bit size {other}")),
            }
        }
        other => wrong_type("float", other),
    }
}

fn exit(args: &[Object]) -> Object {
    match args {
        [] => std::process::exit(0),
        [Object::Int(code)] => std::process::exit(*code as i32),
        [msg @ (Object::String(_) | Object::Error(_))] => {
            println!("{msg}");
            std::process::exit(0)
        }
        [msg @ (Object::String(_) | Object::Error(_)), Object::Int(code)] => {
            println!("{msg}");
            std::process::exit(*code as i32)
        }
        [other] => Object::error(format!(
            "exit: argument must be an int, string or error, got {}",
            other.type_name()
        )),
        [_, _] => Object::error("exit: expected a message and an int exit code"),
        _ => arity("exit", "0, 1 or 2", args.len()),
    }
}

fn append(args: &[Object]) -> Object {
    if args.len() < 2 {
        return arity("append", "at least 2", args.len());
    }
    let Object::List(list) = &args[0] else {
        return Object::error(format!(
            "append: first argument must be a list, got {}",
            args[0].type_name()
        ));
    };
    let mut items = list.to_vec();
    items.extend_from_slice(&args[1..]);
    Object::list(items)
}

fn new(args: &[Object]) -> Object {
    if !args.is_empty() {
        return arity("new", 0, args.len());
    }
    Object::namespace()
}

fn failed(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("failed", 1, args.len());
    };
    Object::Bool(arg.is_error())
}

fn plugin(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("plugin", 1, args.len());
    };
    let Object::String(path) = arg else {
        return Object::error(format!(
            "plugin: first argument must be a string, got {}",
            arg.type_name()
        ));
    };
    match Native::open(&path.to_string_lossy()) {
        Ok(lib) => Object::native(lib),
        Err(e) => Object::error(format!("plugin: {e}")),
    }
}

fn pipe(args: &[Object]) -> Object {
    match args {
        [] => Object::pipe(Pipe::unbuffered()),
        [size] => match expect_int("pipe", "argument", size) {
            Ok(n) if n < 0 => Object::error(format!(
                "pipe: invalid argument: size {n}, must not be negative"
            )),
            Ok(n) => Object::pipe(Pipe::buffered(n as usize)),
            Err(e) => e,
        },
        _ => arity("pipe", "0 or 1", args.len()),
    }
}

fn send(args: &[Object]) -> Object {
    let [p, value] = args else {
        return arity("send", 2, args.len());
    };
    let pipe = match expect_pipe("send", p) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match pipe.send(value.clone()) {
        Ok(()) => value.clone(),
        Err(e) => Object::error(format!("send: {e}")),
    }
}

fn recv(args: &[Object]) -> Object {
    let [p] = args else {
        return arity("recv", 1, args.len());
    };
    match expect_pipe("recv", p) {
        Ok(pipe) => pipe.recv(),
        Err(e) => e,
    }
}

fn close(args: &[Object]) -> Object {
    let [p] = args else {
        return arity("close", 1, args.len());
    };
    let pipe = match expect_pipe("close", p) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match pipe.close() {
        Ok(()) => Object::Null,
        Err(e) => Object::error(format!("close: {e}")),
    }
}

fn radix(name: &str, args: &[Object], fmt: fn(i64) -> String) -> Object {
    let [arg] = args else {
        return arity(name, 1, args.len());
    };
    match expect_int(name, "argument", arg) {
        Ok(i) => Object::string(fmt(i)),
        Err(e) => e,
    }
}

fn hex(args: &[Object]) -> Object {
    radix("hex", args, |i| format!("0x{i:x}"))
}

fn oct(args: &[Object]) -> Object {
    radix("oct", args, |i| format!("0o{i:o}"))
}

fn bin(args: &[Object]) -> Object {
    radix("bin", args, |i| format!("0b{i:b}"))
}

fn slice(args: &[Object]) -> Object {
    let [target, start, end] = args else {
        return arity("slice", 3, args.len());
    };
    let start = match expect_int("slice", "second argument", start) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let end = match expect_int("slice", "third argument", end) {
        Ok(i) => i,
        Err(e) => return e,
    };
    if start < 0 || end < 0 {
        return Object::error("slice: invalid argument: index must not be negative");
    }
    if end < start {
        return Object::error(format!("slice: invalid slice indices: {end} < {start}"));
    }
    let (start, end) = (start as usize, end as usize);
    let len = match target {
        Object::List(l) => l.len(),
        Object::String(s) | Object::Bytes(s) => s.len(),
        other => {
            return Object::error(format!(
                "slice: first argument must be a list, string or bytes, got {}",
                other.type_name()
            ))
        }
    };
    if end > len {
        return Object::error(format!("slice: index out of range [{start}:{end}] with length {len}"));
    }
    if start == end {
        return match target {
            Object::List(_) => Object::list(Vec::new()),
            Object::Bytes(_) => Object::bytes(Vec::new()),
            _ => Object::string(Vec::new()),
        };
    }
    let sliced = match target {
        Object::List(l) => List::slice(l, start, end).map(|s| Object::List(alloc(s))),
        Object::String(s) => ByteSeq::slice(s, start, end).map(|s| Object::String(alloc(s))),
        Object::Bytes(s) => ByteSeq::slice(s, start, end).map(|s| Object::Bytes(alloc(s))),
        _ => None,
    };
    sliced.unwrap_or_else(|| Object::error("slice: index out of range"))
}

fn keys(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("keys", 1, args.len());
    };
    match arg {
        Object::Map(m) => Object::list(m.keys()),
        other => Object::error(format!(
            "keys: argument must be a map, got {}",
            other.type_name()
        )),
    }
}

fn delete(args: &[Object]) -> Object {
    let [target, key] = args else {
        return arity("delete", 2, args.len());
    };
    let Object::Map(m) = target else {
        return Object::error(format!(
            "delete: first argument must be a map, got {}",
            target.type_name()
        ));
    };
    match key {
        Object::Bool(_) | Object::Int(_) | Object::Float(_) | Object::String(_) | Object::Error(_) => {
            m.delete(key);
            Object::Null
        }
        other => Object::error(format!(
            "delete: second argument must be one of bool, int, float, string, error, got {}",
            other.type_name()
        )),
    }
}

fn bytes(args: &[Object]) -> Object {
    let [arg] = args else {
        return arity("bytes", 1, args.len());
    };
    match arg {
        Object::String(s) => Object::Bytes(alloc(ByteSeq::view(s))),
        Object::Bytes(_) => arg.clone(),
        Object::List(l) => {
            let mut out = Vec::with_capacity(l.len());
            for item in l.to_vec() {
                match item {
                    Object::Int(i) => out.push(i as u8),
                    other => {
                        return Object::error(format!(
                            "bytes: list elements must be int, got {}",
                            other.type_name()
                        ))
                    }
                }
            }
            Object::bytes(out)
        }
        other => Object::error(format!(
            "bytes: argument must be a string or a list of int, got {}",
            other.type_name()
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tau_core::object::Map;

    fn call(name: &str, args: &[Object]) -> Object {
        let b = get(index_of(name).unwrap()).unwrap();
        b.call(args)
    }

    fn err_text(o: &Object) -> String {
        assert!(o.is_error(), "expected error, got {o:?}");
        o.to_string()
    }

    #[test]
    fn test_table_order() {
        let names: Vec<_> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            [
                "len", "println", "print", "input", "string", "error", "type", "int", "float",
                "exit", "append", "new", "failed", "plugin", "pipe", "send", "recv", "close",
                "hex", "oct", "bin", "slice", "keys", "delete", "bytes"
            ]
        );
        assert!(get(25).is_none());
    }

    #[test]
    fn test_len() {
        assert!(call("len", &[Object::string("héllo")]).equals(&Object::Int(6)));
        assert!(call("len", &[Object::list(vec![Object::Null; 3])]).equals(&Object::Int(3)));
        assert!(call("len", &[Object::bytes(vec![1, 2])]).equals(&Object::Int(2)));
        assert_eq!(
            err_text(&call("len", &[])),
            "len: wrong number of arguments, expected 1, got 0"
        );
        assert_eq!(
            err_text(&call("len", &[Object::Int(1)])),
            "len: object of type \"int\" has no length"
        );
    }

    #[test]
    fn test_type_and_failed() {
        assert_eq!(call("type", &[Object::Float(1.0)]).to_string(), "float");
        assert_eq!(call("type", &[Object::namespace()]).to_string(), "object");
        assert!(call("failed", &[Object::error("x")]).equals(&Object::Bool(true)));
        assert!(call("failed", &[Object::Int(0)]).equals(&Object::Bool(false)));
    }

    #[test]
    fn test_int_conversions() {
        assert!(call("int", &[Object::Float(3.9)]).equals(&Object::Int(3)));
        assert!(call("int", &[Object::string(" 42 ")]).equals(&Object::Int(42)));
        assert_eq!(
            err_text(&call("int", &[Object::string("abc")])),
            "int: abc is not a number"
        );
        let n = Object::native(Native::Pointer(0xff));
        assert!(call("int", &[n.clone(), Object::Int(8)]).equals(&Object::Int(-1)));
        assert!(call("int", &[n.clone(), Object::Int(64)]).equals(&Object::Int(255)));
        assert!(call("int", &[n, Object::Int(7)]).is_error());
    }

    #[test]
    fn test_float_conversions() {
        assert!(call("float", &[Object::Int(2)]).equals(&Object::Float(2.0)));
        let bits = Native::Pointer(1.5f64.to_bits() as usize);
        assert!(call("float", &[Object::native(bits), Object::Int(64)]).equals(&Object::Float(1.5)));
        let bits = Native::Pointer(2.5f32.to_bits() as usize);
        assert!(call("float", &[Object::native(bits)]).equals(&Object::Float(2.5)));
    }

    #[test]
    fn test_string_of_native_reads_c_string() {
        let text = c"from C";
        let n = Object::native(Native::Pointer(text.as_ptr() as usize));
        assert_eq!(call("string", &[n]).to_string(), "from C");
        let null = Object::native(Native::Pointer(0));
        assert!(call("string", &[null]).is_error());
    }

    #[test]
    fn test_append_copies() {
        let list = Object::list(vec![Object::Int(1)]);
        let out = call("append", &[list.clone(), Object::Int(2), Object::Int(3)]);
        assert_eq!(out.to_string(), "[1, 2, 3]");
        assert_eq!(list.to_string(), "[1]");
        assert!(call("append", &[list]).is_error());
    }

    #[test]
    fn test_radix_formatting() {
        assert_eq!(call("hex", &[Object::Int(255)]).to_string(), "0xff");
        assert_eq!(call("oct", &[Object::Int(8)]).to_string(), "0o10");
        assert_eq!(call("bin", &[Object::Int(5)]).to_string(), "0b101");
        assert!(call("hex", &[Object::string("1")]).is_error());
    }

    #[test]
    fn test_slice() {
        let s = Object::string("hello world");
        let part = call("slice", &[s.clone(), Object::Int(6), Object::Int(11)]);
        assert_eq!(part.to_string(), "world");
        let empty = call("slice", &[s.clone(), Object::Int(3), Object::Int(3)]);
        assert_eq!(empty.to_string(), "");
        assert_eq!(
            err_text(&call("slice", &[s.clone(), Object::Int(4), Object::Int(2)])),
            "slice: invalid slice indices: 2 < 4"
        );
        assert!(call("slice", &[s.clone(), Object::Int(-1), Object::Int(2)]).is_error());
        assert!(call("slice", &[s, Object::Int(0), Object::Int(99)]).is_error());
    }

    #[test]
    fn test_list_slice_writes_through() {
        let list = Object::list(vec![Object::Int(1), Object::Int(2), Object::Int(3)]);
        let part = call("slice", &[list.clone(), Object::Int(1), Object::Int(3)]);
        let Object::List(p) = &part else { unreachable!() };
        assert!(p.set(0, Object::Int(20)));
        assert_eq!(list.to_string(), "[1, 20, 3]");
    }

    #[test]
    fn test_keys_and_delete() {
        let map = Object::map(Map::new());
        let Object::Map(m) = &map else { unreachable!() };
        m.set(Object::string("a"), Object::Int(1));
        m.set(Object::Int(2), Object::Int(2));
        let Object::List(k) = call("keys", &[map.clone()]) else {
            panic!("keys must return a list")
        };
        assert_eq!(k.len(), 2);
        assert!(call("delete", &[map.clone(), Object::string("a")]).is_null());
        assert_eq!(m.len(), 1);
        assert!(call("delete", &[map, Object::list(vec![])]).is_error());
    }

    #[test]
    fn test_bytes() {
        let s = Object::string("ab");
        let b = call("bytes", &[s.clone()]);
        let (Object::Bytes(bs), Object::String(ss)) = (&b, &s) else {
            unreachable!()
        };
        assert!(std::ptr::eq(bs.as_slice().as_ptr(), ss.as_slice().as_ptr()));
        let list = Object::list(vec![Object::Int(104), Object::Int(105)]);
        assert_eq!(call("bytes", &[list]).as_bytes(), Some(&b"hi"[..]));
        assert!(call("bytes", &[Object::list(vec![Object::Null])]).is_error());
    }

    #[test]
    fn test_pipe_builtins() {
        assert_eq!(
            err_text(&call("pipe", &[Object::Int(-1)])),
            "pipe: invalid argument: size -1, must not be negative"
        );
        let p = call("pipe", &[Object::Int(2)]);
        assert!(call("send", &[p.clone(), Object::Int(1)]).equals(&Object::Int(1)));
        assert!(call("recv", &[p.clone()]).equals(&Object::Int(1)));
        assert!(call("close", &[p.clone()]).is_null());
        assert_eq!(err_text(&call("close", &[p.clone()])), "close: pipe already closed");
        assert_eq!(err_text(&call("send", &[p.clone(), Object::Int(2)])), "send: closed pipe");
        assert!(call("recv", &[p]).is_null());
        assert!(call("recv", &[Object::Int(1)]).is_error());
    }

    #[test]
    fn test_error_and_new() {
        let e = call("error", &[Object::string("boom")]);
        assert!(e.is_error());
        assert_eq!(e.to_string(), "boom");
        assert!(matches!(call("new", &[]), Object::Namespace(_)));
    }
}
