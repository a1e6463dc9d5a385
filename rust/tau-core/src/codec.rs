//! Binary encoding of compiled units.
//!
//! All integers are unsigned big-endian:
//! ```text
//! u32 ndefs
//! u32 code_len, code_len bytes
//! u32 const_count, const...
//! u32 bookmark_count, bookmark...
//!
//! const    = u8 tag, payload
//!   null     -> (none)
//!   bool     -> u8
//!   int      -> u64
//!   float    -> u64 (IEEE-754 bits)
//!   string   -> u32 len, len bytes
//!   function -> u32 num_params, u32 num_locals, u32 code_len, code_len bytes,
//!               u32 bookmark_count, bookmark...
//! bookmark = u32 offset, u32 lineno, u32 pos, u32 line_len, line_len bytes
//! ```

use crate::bytecode::Bytecode;
use crate::object::{Bookmark, Function, Object, ObjectType};
use std::sync::Arc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("decoder: empty bytecode")]
    EmptyBytecode,
    #[error("decoder: buffer overflow (needed {needed} bytes, {remaining} remaining)")]
    BufferOverflow { needed: usize, remaining: usize },
    #[error("encoder: unsupported encoding for type {0}")]
    UnsupportedEncoding(&'static str),
    #[error("decoder: unsupported decoding for type {0}")]
    UnsupportedDecoding(String),
    #[error("encoder: {what} length {len} does not fit in 32 bits")]
    TooLarge { what: &'static str, len: usize },
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub fn encode(bc: &Bytecode) -> Result<Vec<u8>, CodecError> {
    let mut enc = Encoder::default();
    enc.u32(bc.ndefs);
    enc.blob("instructions", &bc.instructions)?;
    enc.len("constants", bc.constants.len())?;
    for c in &bc.constants {
        enc.constant(c)?;
    }
    enc.bookmarks(&bc.bookmarks)?;
    Ok(enc.buf)
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn len(&mut self, what: &'static str, len: usize) -> Result<(), CodecError> {
        let v = u32::try_from(len).map_err(|_| CodecError::TooLarge { what, len })?;
        self.u32(v);
        Ok(())
    }

    fn blob(&mut self, what: &'static str, bytes: &[u8]) -> Result<(), CodecError> {
        self.len(what, bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn bookmarks(&mut self, bookmarks: &[Bookmark]) -> Result<(), CodecError> {
        self.len("bookmarks", bookmarks.len())?;
        for b in bookmarks {
            self.u32(b.offset);
            self.u32(b.lineno);
            self.u32(b.pos);
            self.blob("bookmark line", &b.line)?;
        }
        Ok(())
    }

    fn constant(&mut self, o: &Object) -> Result<(), CodecError> {
        match o {
            Object::Null => self.buf.push(ObjectType::Null as u8),
            Object::Bool(b) => {
                self.buf.push(ObjectType::Boolean as u8);
                self.buf.push(u8::from(*b));
            }
            Object::Int(i) => {
                self.buf.push(ObjectType::Integer as u8);
                self.u64(*i as u64);
            }
            Object::Float(f) => {
                self.buf.push(ObjectType::Float as u8);
                self.u64(f.to_bits());
            }
            Object::String(s) => {
                self.buf.push(ObjectType::String as u8);
                self.blob("string", s.as_slice())?;
            }
            Object::Function(f) => {
                self.buf.push(ObjectType::Function as u8);
                self.u32(f.num_params);
                self.u32(f.num_locals);
                self.blob("function", &f.instructions)?;
                self.bookmarks(&f.bookmarks)?;
            }
            other => return Err(CodecError::UnsupportedEncoding(other.type_name())),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub fn decode(bytes: &[u8]) -> Result<Bytecode, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyBytecode);
    }
    let mut dec = Decoder { buf: bytes, pos: 0 };
    let ndefs = dec.u32()?;
    let instructions = dec.blob()?.to_vec();
    let nconsts = dec.u32()? as usize;
    // Every constant needs at least its tag byte.
    let mut constants = Vec::with_capacity(nconsts.min(dec.remaining()));
    for _ in 0..nconsts {
        constants.push(dec.constant()?);
    }
    let bookmarks = dec.bookmarks()?;
    Ok(Bytecode {
        ndefs,
        instructions,
        constants,
        bookmarks,
    })
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::BufferOverflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    fn blob(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn bookmarks(&mut self) -> Result<Vec<Bookmark>, CodecError> {
        let n = self.u32()? as usize;
        // A bookmark is at least 16 bytes.
        let mut out = Vec::with_capacity(n.min(self.remaining() / 16));
        for _ in 0..n {
            let offset = self.u32()?;
            let lineno = self.u32()?;
            let pos = self.u32()?;
            let line = self.blob()?.to_vec();
            out.push(Bookmark {
                offset,
                lineno,
                pos,
                line,
            });
        }
        Ok(out)
    }

    fn constant(&mut self) -> Result<Object, CodecError> {
        let tag = self.u8()?;
        match ObjectType::from_u8(tag) {
            Some(ObjectType::Null) => Ok(Object::Null),
            Some(ObjectType::Boolean) => Ok(Object::Bool(self.u8()? != 0)),
            Some(ObjectType::Integer) => Ok(Object::Int(self.u64()? as i64)),
            Some(ObjectType::Float) => Ok(Object::Float(f64::from_bits(self.u64()?))),
            Some(ObjectType::String) => Ok(Object::string(self.blob()?.to_vec())),
            Some(ObjectType::Function) => {
                let num_params = self.u32()?;
                let num_locals = self.u32()?;
                let instructions = self.blob()?.to_vec();
                let bookmarks = self.bookmarks()?;
                Ok(Object::Function(Arc::new(Function {
                    instructions,
                    num_params,
                    num_locals,
                    bookmarks,
                })))
            }
            Some(other) => Err(CodecError::UnsupportedDecoding(other.name().to_string())),
            None => Err(CodecError::UnsupportedDecoding(format!("tag {tag}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
