//! Fatal VM errors and their source-mapped rendering.

use std::fmt;
use tau_core::object::Bookmark;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A condition that aborts the current execution unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("unsupported operator '{op}' for types {left} and {right}")]
    UnsupportedOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("unsupported operator '{op}' for type {operand}")]
    UnsupportedUnary {
        op: &'static str,
        operand: &'static str,
    },
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgumentCount { expected: usize, got: usize },
    #[error("calling non-function")]
    NotCallable,
    #[error("not a function {0}")]
    NotAFunction(String),
    #[error("invalid index operator for types {left} and {index}")]
    InvalidIndex {
        left: &'static str,
        index: &'static str,
    },
    #[error("{kind} object has no attribute {name}")]
    NoAttribute { kind: &'static str, name: String },
    #[error("cannot assign to type \"{0}\"")]
    CannotAssign(&'static str),
    #[error("invalid map key type {0}")]
    InvalidMapKey(&'static str),
    #[error("interpolate: format constant must be a string, got {0}")]
    InvalidFormat(&'static str),
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("frame overflow: call depth exceeds {0}")]
    FrameOverflow(usize),
    #[error("no active frame")]
    NoFrame,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("truncated instruction stream")]
    TruncatedInstruction,
    #[error("constant index {0} out of range")]
    ConstantIndex(usize),
    #[error("global index {0} out of range")]
    GlobalIndex(usize),
    #[error("local index {0} out of range")]
    LocalIndex(usize),
    #[error("free variable index {0} out of range")]
    FreeIndex(usize),
    #[error("builtin index {0} out of range")]
    BuiltinIndex(usize),
    #[error("import: {0}")]
    Import(String),
    #[error("failed to create thread: {0}")]
    Spawn(String),
    #[error("unsupported argument type {0} for native objects")]
    NativeArgument(&'static str),
    #[error("native call: {0}")]
    NativeCall(String),
}

// ---------------------------------------------------------------------------
// Fatal
// ---------------------------------------------------------------------------

/// A [`VmError`] located in the source, as reported when a unit aborts.
#[derive(Debug, Clone)]
pub struct Fatal {
    pub error: VmError,
    pub file: String,
    pub bookmark: Option<Bookmark>,
}

impl Fatal {
    pub fn new(error: VmError, file: impl Into<String>, bookmark: Option<Bookmark>) -> Self {
        Self {
            error,
            file: file.into(),
            bookmark,
        }
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bookmark {
            Some(b) => {
                let caret = format!("{}^", " ".repeat(b.pos as usize));
                write!(
                    f,
                    "error in file {} at line {}:\n    {}\n    {}\n{}",
                    self.file,
                    b.lineno,
                    String::from_utf8_lossy(&b.line),
                    caret,
                    self.error
                )
            }
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for Fatal {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
