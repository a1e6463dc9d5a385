//! GC header and heap cells for reference objects.
//!
//! Every heap-allocated object is wrapped in a [`HeapCell`], which prepends a
//! [`GcHeader`] to the value. The header carries the mark bit used by the
//! collector of the execution unit that allocated the object, and a shared
//! bit recording that the object escaped to another execution unit (through a
//! pipe, a global, a spawned call or a shared container).
//!
//! Ownership of the backing storage is handled by reference counting; the
//! collector only decides when an unreachable object must be *disposed*,
//! which severs the references it holds so cycles cannot keep memory alive.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Header prepended to all GC-managed heap objects.
///
/// Layout (4 bytes):
/// ```text
/// flags (u32):
///   [0]    marked: reached during the current mark phase
///   [1]    shared: reachable from more than one execution unit
///   [31:2] unused
/// ```
///
/// The flags are atomic so that root categories can be marked from several
/// threads at once.
pub struct GcHeader {
    flags: AtomicU32,
}

const MARKED_BIT: u32 = 1 << 0;
const SHARED_BIT: u32 = 1 << 1;

impl GcHeader {
    /// Create a new header, unmarked and private to its allocating unit.
    pub const fn new() -> Self {
        Self {
            flags: AtomicU32::new(0),
        }
    }

    // --- Marked ---

    /// Returns `true` if the object has been marked (live).
    pub fn is_marked(&self) -> bool {
        self.flags.load(Ordering::Acquire) & MARKED_BIT != 0
    }

    /// Mark the object as live. Returns `true` if this call set the bit,
    /// i.e. the object had not been reached yet in this mark phase.
    pub fn mark(&self) -> bool {
        self.flags.fetch_or(MARKED_BIT, Ordering::AcqRel) & MARKED_BIT == 0
    }

    /// Clear the mark bit after a sweep.
    pub fn unmark(&self) {
        self.flags.fetch_and(!MARKED_BIT, Ordering::AcqRel);
    }

    // --- Shared ---

    /// Returns `true` if the object may be reachable from another unit.
    pub fn is_shared(&self) -> bool {
        self.flags.load(Ordering::Acquire) & SHARED_BIT != 0
    }

    /// Flag the object as shared. Returns `true` if this call set the bit.
    pub fn share(&self) -> bool {
        self.flags.fetch_or(SHARED_BIT, Ordering::AcqRel) & SHARED_BIT == 0
    }
}

impl Default for GcHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcHeader")
            .field("marked", &self.is_marked())
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// A heap object: a [`GcHeader`] followed by the object body.
pub struct HeapCell<T> {
    header: GcHeader,
    value: T,
}

impl<T> HeapCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            header: GcHeader::new(),
            value,
        }
    }

    pub fn header(&self) -> &GcHeader {
        &self.header
    }
}

impl<T> Deref for HeapCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for HeapCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Shared handle to a GC-managed heap object.
pub type Gc<T> = Arc<HeapCell<T>>;

/// Allocate `value` in a fresh heap cell.
pub fn alloc<T>(value: T) -> Gc<T> {
    Arc::new(HeapCell::new(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_starts_clear() {
        let h = GcHeader::new();
        assert!(!h.is_marked());
        assert!(!h.is_shared());
    }

    #[test]
    fn test_mark_reports_first_visit_only() {
        let h = GcHeader::new();
        assert!(h.mark());
        assert!(!h.mark());
        assert!(h.is_marked());
        h.unmark();
        assert!(!h.is_marked());
        assert!(h.mark());
    }

    #[test]
    fn test_share_is_independent_of_mark() {
        let h = GcHeader::new();
        assert!(h.share());
        assert!(!h.share());
        assert!(h.is_shared());
        assert!(!h.is_marked());
        h.mark();
        h.unmark();
        assert!(h.is_shared());
    }

    #[test]
    fn test_heap_cell_derefs_to_value() {
        let cell = alloc(vec![1, 2, 3]);
        assert_eq!(cell.len(), 3);
        assert!(!cell.header().is_marked());
    }
}
