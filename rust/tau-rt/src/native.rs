//! Calls into native symbols resolved from plugins.
//!
//! Arguments are marshaled into two classes: integer-class words (booleans,
//! integers, C string pointers, null) and double-precision floats, and the
//! call goes through a libffi call interface built from those classes. The
//! result is always read back as a pointer-sized word.

use crate::error::VmError;
use libffi::middle::{Arg as FfiArg, Cif, CodePtr, Type};
use std::ffi::{c_void, CString};
use tau_core::Object;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Arg {
    Word(i64),
    Double(f64),
}

/// Call the function at `addr` with `args`.
pub(crate) fn call(addr: usize, args: &[Object]) -> Result<usize, VmError> {
    // C strings must outlive the call.
    let mut strings: Vec<CString> = Vec::new();
    let mut marshaled = Vec::with_capacity(args.len());
    for arg in args {
        let a = match arg {
            Object::Bool(b) => Arg::Word(i64::from(*b)),
            Object::Int(i) => Arg::Word(*i),
            Object::Float(f) => Arg::Double(*f),
            Object::Null => Arg::Word(0),
            Object::String(s) => {
                let c = CString::new(s.as_slice()).map_err(|_| {
                    VmError::NativeCall("string argument contains a NUL byte".into())
                })?;
                let ptr = c.as_ptr() as usize as i64;
                strings.push(c);
                Arg::Word(ptr)
            }
            other => return Err(VmError::NativeArgument(other.type_name())),
        };
        marshaled.push(a);
    }
    invoke(addr, &marshaled)
}

/// Build a call interface from the argument classes and call through it.
/// The return type is a pointer-sized word.
fn invoke(addr: usize, args: &[Arg]) -> Result<usize, VmError> {
    if addr == 0 {
        return Err(VmError::NativeCall("null function address".into()));
    }
    let cif = Cif::new(
        args.iter().map(|a| match a {
            Arg::Word(_) => Type::i64(),
            Arg::Double(_) => Type::f64(),
        }),
        Type::pointer(),
    );
    let values: Vec<FfiArg> = args
        .iter()
        .map(|a| match a {
            Arg::Word(w) => FfiArg::new(w),
            Arg::Double(d) => FfiArg::new(d),
        })
        .collect();
    // SAFETY: `addr` was resolved from a loaded library that the symbol
    // handle keeps alive; the script vouches for the signature.
    let ret: *mut c_void = unsafe { cif.call(CodePtr::from_ptr(addr as *const c_void), &values) };
    Ok(ret as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
