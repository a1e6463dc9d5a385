//! In-memory compiled unit.

use crate::object::{Bookmark, Function, Object};

/// A compiled program: top-level instructions, the constant pool, the
/// bookmarks of the top-level code and the number of global definitions.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ndefs: u32,
    pub instructions: Vec<u8>,
    pub constants: Vec<Object>,
    pub bookmarks: Vec<Bookmark>,
}

impl Bytecode {
    pub fn new(instructions: Vec<u8>, constants: Vec<Object>) -> Self {
        Self {
            instructions,
            constants,
            ..Default::default()
        }
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    pub fn with_ndefs(mut self, ndefs: u32) -> Self {
        self.ndefs = ndefs;
        self
    }

    /// The top-level code packaged as a parameterless function.
    pub fn main_function(&self) -> Function {
        Function::new(self.instructions.clone(), 0, 0).with_bookmarks(self.bookmarks.clone())
    }
}
