//! Tracing support for the collector: child enumeration, marking, sharing
//! and disposal, dispatched over the closed set of object kinds.
//!
//! Invariant: every object reachable from a shared object is shared. Shared
//! objects may be referenced from other execution units, so a unit's
//! collector neither marks through them nor disposes them.

use crate::object::Object;

impl Object {
    /// Push the objects directly referenced by `self` onto `out`. A slice
    /// reports its owner instead of the elements of its window.
    pub fn children(&self, out: &mut Vec<Object>) {
        match self {
            Object::String(s) => {
                if let Some(owner) = s.owner() {
                    out.push(Object::String(owner.clone()));
                }
            }
            Object::Error(s) => {
                if let Some(owner) = s.owner() {
                    out.push(Object::Error(owner.clone()));
                }
            }
            Object::Bytes(s) => {
                if let Some(owner) = s.owner() {
                    out.push(Object::Bytes(owner.clone()));
                }
            }
            Object::List(l) => match l.owner() {
                Some(owner) => out.push(Object::List(owner.clone())),
                None => out.extend(l.to_vec()),
            },
            Object::Map(m) => {
                for (k, v) in m.entries() {
                    out.push(k);
                    out.push(v);
                }
            }
            Object::Closure(c) => out.extend(c.free.iter().cloned()),
            Object::Namespace(n) => out.extend(n.values()),
            Object::Pipe(p) => out.extend(p.queued()),
            Object::GetSetter(gs) => out.extend(gs.referents()),
            Object::Null
            | Object::Bool(_)
            | Object::Int(_)
            | Object::Float(_)
            | Object::Builtin(_)
            | Object::Function(_)
            | Object::Native(_) => {}
        }
    }

    /// Mark `self` and every unit-private object reachable from it.
    pub fn mark(&self) {
        let mut work = vec![self.clone()];
        while let Some(o) = work.pop() {
            if let Some(h) = o.header() {
                if h.is_shared() || !h.mark() {
                    continue;
                }
            }
            o.children(&mut work);
        }
    }

    /// Flag `self` and everything reachable from it as shared.
    pub fn share(&self) {
        let mut work = vec![self.clone()];
        while let Some(o) = work.pop() {
            if let Some(h) = o.header() {
                if !h.share() {
                    continue;
                }
            }
            o.children(&mut work);
        }
    }

    /// Finalize an unreachable object by dropping the references it holds,
    /// so reference cycles through it are broken. Shared objects and slices
    /// are left intact: a slice holds no storage of its own, and its owner
    /// is released only through the owner itself.
    pub fn dispose(&self) {
        if self.header().is_some_and(|h| h.is_shared()) {
            return;
        }
        match self {
            Object::List(l) => l.clear(),
            Object::Map(m) => m.clear(),
            Object::Namespace(n) => n.clear(),
            Object::Pipe(p) => p.clear(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gc::alloc;
    use crate::object::{ByteSeq, GetSetter, List, Map, Object};
    use std::sync::Arc;

    fn marked(o: &Object) -> bool {
        o.header().unwrap().is_marked()
    }

    #[test]
    fn test_mark_reaches_nested_containers() {
        let inner = Object::list(vec![Object::string("x")]);
        let map = Map::new();
        map.set(Object::Int(1), inner.clone());
        let outer = Object::map(map);
        outer.mark();
        assert!(marked(&outer));
        assert!(marked(&inner));
        let Object::List(l) = &inner else { unreachable!() };
        assert!(marked(&l.get(0).unwrap()));
    }

    #[test]
    fn test_mark_slice_marks_owner_not_window() {
        let owner = alloc(List::new(vec![Object::string("a"), Object::string("b")]));
        let slice = Object::List(alloc(List::slice(&owner, 1, 2).unwrap()));
        slice.mark();
        assert!(owner.header().is_marked());
        assert!(marked(&owner.get(0).unwrap()));
    }

    #[test]
    fn test_mark_string_slice_marks_owner() {
        let owner = ByteSeq::alloc(b"hello");
        let slice = Object::String(alloc(ByteSeq::slice(&owner, 1, 3).unwrap()));
        slice.mark();
        assert!(owner.header().is_marked());
    }

    #[test]
    fn test_mark_skips_shared_objects() {
        let shared = Object::list(vec![]);
        shared.share();
        let holder = Object::list(vec![shared.clone()]);
        holder.mark();
        assert!(marked(&holder));
        assert!(!marked(&shared));
    }

    #[test]
    fn test_mark_handles_cycles() {
        let a = alloc(List::new(vec![Object::Null]));
        a.set(0, Object::List(a.clone()));
        Object::List(a.clone()).mark();
        assert!(a.header().is_marked());
        Object::List(a.clone()).dispose();
        assert_eq!(Arc::strong_count(&a), 1);
    }

    #[test]
    fn test_share_is_transitive() {
        let leaf = Object::string("leaf");
        let mid = Object::list(vec![leaf.clone()]);
        let root = Object::closure(Arc::new(Default::default()), vec![mid.clone()]);
        root.share();
        assert!(leaf.header().unwrap().is_shared());
        assert!(mid.header().unwrap().is_shared());
    }

    #[test]
    fn test_getsetter_traces_its_container() {
        let list = alloc(List::new(vec![Object::Int(1)]));
        let gs = Object::getsetter(GetSetter::ListIndex { list: list.clone(), index: 0 });
        gs.mark();
        assert!(list.header().is_marked());
    }

    #[test]
    fn test_dispose_leaves_shared_and_slices_intact() {
        let owner = alloc(List::new(vec![Object::Int(1), Object::Int(2)]));
        let slice = Object::List(alloc(List::slice(&owner, 0, 2).unwrap()));
        slice.dispose();
        assert_eq!(owner.len(), 2);

        let shared = Object::list(vec![Object::Int(1)]);
        shared.share();
        shared.dispose();
        let Object::List(l) = &shared else { unreachable!() };
        assert_eq!(l.len(), 1);
    }
}
