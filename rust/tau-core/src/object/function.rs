//! Compiled functions, closures and source bookmarks.

use crate::object::Object;
use std::fmt;
use std::sync::Arc;

/// Source position attached to an instruction offset for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bookmark {
    /// Offset just past the last instruction generated for this source
    /// position.
    pub offset: u32,
    pub lineno: u32,
    /// Column of the offending token within `line`.
    pub pos: u32,
    /// Raw bytes of the whole source line, without terminator.
    pub line: Vec<u8>,
}

impl Bookmark {
    pub fn new(offset: u32, lineno: u32, pos: u32, line: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            lineno,
            pos,
            line: line.into(),
        }
    }

    /// First bookmark whose offset is at or past `offset`, that is the
    /// position of the instruction containing byte `offset - 1`.
    pub fn lookup(bookmarks: &[Bookmark], offset: usize) -> Option<&Bookmark> {
        bookmarks.iter().find(|b| b.offset as usize >= offset)
    }
}

/// An immutable compiled function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Function {
    pub instructions: Vec<u8>,
    pub num_params: u32,
    pub num_locals: u32,
    pub bookmarks: Vec<Bookmark>,
}

impl Function {
    pub fn new(instructions: Vec<u8>, num_params: u32, num_locals: u32) -> Self {
        Self {
            instructions,
            num_params,
            num_locals,
            bookmarks: Vec::new(),
        }
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<Bookmark>) -> Self {
        self.bookmarks = bookmarks;
        self
    }
}

/// A function together with the free variables captured when it was
/// created. The captured values are copies; later rebinding of the
/// original variables is not observed.
pub struct Closure {
    pub func: Arc<Function>,
    pub free: Vec<Object>,
}

impl Closure {
    pub fn new(func: Arc<Function>, free: Vec<Object>) -> Self {
        Self { func, free }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("num_params", &self.func.num_params)
            .field("num_free", &self.free.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_lookup_picks_first_at_or_after() {
        let marks = vec![
            Bookmark::new(0, 1, 0, "a"),
            Bookmark::new(5, 2, 0, "b"),
            Bookmark::new(9, 3, 0, "c"),
        ];
        assert_eq!(Bookmark::lookup(&marks, 0).unwrap().lineno, 1);
        assert_eq!(Bookmark::lookup(&marks, 3).unwrap().lineno, 2);
        assert_eq!(Bookmark::lookup(&marks, 9).unwrap().lineno, 3);
        assert!(Bookmark::lookup(&marks, 10).is_none());
        assert!(Bookmark::lookup(&[], 0).is_none());
    }
}
