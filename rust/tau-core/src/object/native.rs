//! Handles to native code: loaded libraries, resolved symbols and raw
//! values returned from foreign calls.

use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("{0}")]
    Open(String),
    #[error("no function with name '{0}' found")]
    MissingSymbol(String),
}

/// An opaque native handle.
pub enum Native {
    /// A dynamic library opened by the `plugin` builtin.
    Library { path: String, lib: Arc<Library> },
    /// A symbol resolved from a library. The library is kept loaded for as
    /// long as the symbol is reachable.
    Symbol {
        name: String,
        addr: usize,
        lib: Arc<Library>,
    },
    /// The machine word returned by a foreign call.
    Pointer(usize),
}

impl Native {
    /// Open the dynamic library at `path`.
    pub fn open(path: &str) -> Result<Native, NativeError> {
        // SAFETY: loading a library runs its initialisers; the caller asked
        // for this library explicitly.
        let lib = unsafe { Library::new(path) }.map_err(|e| NativeError::Open(e.to_string()))?;
        trace!(path, "opened native library");
        Ok(Native::Library {
            path: path.to_string(),
            lib: Arc::new(lib),
        })
    }

    /// Resolve `name` in this library.
    pub fn symbol(&self, name: &str) -> Result<Native, NativeError> {
        let Native::Library { lib, .. } = self else {
            return Err(NativeError::MissingSymbol(name.to_string()));
        };
        let mut cname = Vec::with_capacity(name.len() + 1);
        cname.extend_from_slice(name.as_bytes());
        cname.push(0);
        // SAFETY: the symbol is only ever used as an address; it is called
        // through the foreign-call bridge with the argument classes the
        // script supplies.
        let addr = unsafe {
            lib.get::<*mut c_void>(&cname)
                .map(|sym| *sym as usize)
                .map_err(|_| NativeError::MissingSymbol(name.to_string()))?
        };
        if addr == 0 {
            return Err(NativeError::MissingSymbol(name.to_string()));
        }
        trace!(name, addr, "resolved native symbol");
        Ok(Native::Symbol {
            name: name.to_string(),
            addr,
            lib: lib.clone(),
        })
    }

    /// Callable address, if this handle is a symbol.
    pub fn address(&self) -> Option<usize> {
        match self {
            Native::Symbol { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// The raw machine word carried by a foreign-call result.
    pub fn word(&self) -> Option<usize> {
        match self {
            Native::Pointer(w) => Some(*w),
            Native::Symbol { addr, .. } => Some(*addr),
            Native::Library { .. } => None,
        }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Native::Library { path, .. } => write!(f, "Library({path})"),
            Native::Symbol { name, addr, .. } => write!(f, "Symbol({name} @ {addr:#x})"),
            Native::Pointer(w) => write!(f, "Pointer({w:#x})"),
        }
    }
}
