//! Per-unit allocation registry and mark-sweep collection.
//!
//! Every reference object allocated by an execution unit is appended to
//! that unit's [`Heap`]. A collection marks everything reachable from the
//! roots, then sweeps the registry: survivors are unmarked, the rest are
//! disposed and dropped from the registry with a swap-remove.

use tau_core::Object;
use tracing::debug;

/// Root sets larger than this are marked on one thread per category.
const PARALLEL_MARK_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub before: usize,
    pub freed: usize,
    pub after: usize,
}

/// Allocation registry of one execution unit.
pub struct Heap {
    objects: Vec<Object>,
    capacity: usize,
    threshold_percent: usize,
    collections: u64,
}

impl Heap {
    pub fn new(capacity: usize, threshold_percent: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            objects: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            threshold_percent: threshold_percent.clamp(1, 100),
            collections: 0,
        }
    }

    /// Register a freshly allocated object. Value kinds are ignored.
    /// Returns `true` if the object was registered.
    pub fn track(&mut self, obj: &Object) -> bool {
        if obj.header().is_none() {
            return false;
        }
        if self.objects.len() == self.capacity {
            self.capacity *= 2;
        }
        self.objects.push(obj.clone());
        true
    }

    /// Whether occupancy crossed the collection threshold.
    pub fn should_collect(&self) -> bool {
        self.objects.len() >= self.capacity.saturating_mul(self.threshold_percent) / 100
    }

    /// Finish a collection whose mark phase is done. Unmarked objects are
    /// disposed and removed; marks are cleared on the survivors. When the
    /// registry is still above threshold afterwards its capacity doubles.
    pub fn sweep(&mut self) -> SweepStats {
        let before = self.objects.len();
        let mut i = before;
        while i > 0 {
            i -= 1;
            let marked = self.objects[i].header().is_some_and(|h| h.is_marked());
            if marked {
                if let Some(h) = self.objects[i].header() {
                    h.unmark();
                }
                continue;
            }
            let dead = self.objects.swap_remove(i);
            dead.dispose();
        }
        self.collections += 1;
        if self.should_collect() {
            self.capacity *= 2;
            debug!(capacity = self.capacity, "gc registry grown");
        }
        let stats = SweepStats {
            before,
            freed: before - self.objects.len(),
            after: self.objects.len(),
        };
        debug!(
            before = stats.before,
            freed = stats.freed,
            after = stats.after,
            "gc sweep"
        );
        stats
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }
}

/// Mark every object reachable from the given root categories. Large root
/// sets are marked concurrently, one scoped thread per category; the mark
/// bits are atomic so overlapping traversals are harmless.
pub fn mark_roots(categories: &[&[Object]]) {
    let total: usize = categories.iter().map(|c| c.len()).sum();
    if total < PARALLEL_MARK_THRESHOLD {
        for roots in categories {
            mark_all(roots);
        }
        return;
    }
    std::thread::scope(|s| {
        for roots in categories {
            s.spawn(move || mark_all(roots));
        }
    });
}

fn mark_all(roots: &[Object]) {
    for o in roots {
        o.mark();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_ignores_value_kinds() {
        let mut heap = Heap::new(10, 90);
        assert!(!heap.track(&Object::Int(1)));
        assert!(!heap.track(&Object::Null));
        assert!(heap.track(&Object::string("x")));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_threshold() {
        let mut heap = Heap::new(100, 90);
        for _ in 0..89 {
            heap.track(&Object::string("x"));
        }
        assert!(!heap.should_collect());
        heap.track(&Object::string("x"));
        assert!(heap.should_collect());
    }

    #[test]
    fn test_sweep_frees_unmarked_and_unmarks_survivors() {
        let mut heap = Heap::new(100, 90);
        let keep = Object::list(vec![Object::Int(1)]);
        let garbage = Object::list(vec![Object::Int(2)]);
        heap.track(&keep);
        heap.track(&garbage);
        mark_roots(&[std::slice::from_ref(&keep)]);
        let stats = heap.sweep();
        assert_eq!(stats, SweepStats { before: 2, freed: 1, after: 1 });
        assert!(!keep.header().unwrap().is_marked());
        let Object::List(l) = &garbage else { unreachable!() };
        assert_eq!(l.len(), 0, "disposed list drops its elements");
        let Object::List(k) = &keep else { unreachable!() };
        assert_eq!(k.len(), 1);
    }

    #[test]
    fn test_capacity_doubles_when_full() {
        let mut heap = Heap::new(2, 90);
        heap.track(&Object::string("a"));
        heap.track(&Object::string("b"));
        heap.track(&Object::string("c"));
        assert_eq!(heap.capacity(), 4);
    }

    #[test]
    fn test_capacity_grows_when_sweep_frees_too_little() {
        let mut heap = Heap::new(10, 50);
        let roots: Vec<Object> = (0..8).map(|_| Object::string("live")).collect();
        for r in &roots {
            heap.track(r);
        }
        mark_roots(&[roots.as_slice()]);
        heap.sweep();
        assert_eq!(heap.capacity(), 20);
        assert_eq!(heap.collections(), 1);
    }

    #[test]
    fn test_parallel_mark_matches_sequential() {
        let roots: Vec<Object> = (0..PARALLEL_MARK_THRESHOLD)
            .map(|i| Object::list(vec![Object::Int(i as i64)]))
            .collect();
        let extra = vec![Object::string("g")];
        mark_roots(&[roots.as_slice(), extra.as_slice(), &[]]);
        assert!(roots.iter().all(|o| o.header().unwrap().is_marked()));
        assert!(extra[0].header().unwrap().is_marked());
    }
}
