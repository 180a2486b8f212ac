//! Marker Module - Incremental marking of the old generation
//!
//! Marking is tri-colour without a separate grey bit:
//!
//! - white: `GCFLAG_VISITED` clear and not queued
//! - grey: queued in the [`MarkQueue`]
//! - black: `GCFLAG_VISITED` set
//!
//! The marker only runs inside a major collection step, which always starts
//! with a minor collection, so it never sees a young object. Between steps
//! the mutator may store anything anywhere; the write barrier records the
//! stored-into objects and the next minor collection greys them again.
//!
//! Objects flagged `GCFLAG_NO_HEAP_PTRS` (untouched prebuilt objects) are
//! never traced: they cannot point into the heap.

pub mod mark_queue;
pub mod roots;

pub use mark_queue::MarkQueue;
pub use roots::{RootCallback, RootWalker, ShadowStack};

use crate::gc::{info_or_abort, Collector};
use crate::object::header::{header, GCFLAG_NO_HEAP_PTRS, GCFLAG_VISITED};
use crate::object::layout::TypeLayoutProvider;
use crate::util::read_word;

impl Collector {
    /// Seed the mark stack for a new cycle
    pub(crate) fn collect_roots(&mut self) {
        self.walk_roots(
            Some(Self::collect_ref_root),
            Some(Self::collect_ref_root),
            None,
            false,
        );

        for &obj in &self.prebuilt_root_objects {
            self.marker.push(obj);
        }
        for &obj in self.scratch_roots.iter().filter(|&&obj| obj != 0) {
            self.marker.push(obj);
        }
        for obj in self.finalizers.pending() {
            self.marker.push(obj);
        }
        log::trace!("major collection seeded {} roots", self.marker.len());
    }

    fn collect_ref_root(gc: &mut Collector, slot: usize) {
        // SAFETY: root walkers report valid slots
        let obj = unsafe { read_word(slot) };
        if obj != 0 {
            gc.marker.push(obj);
        }
    }

    /// Visit up to `budget` objects; returns how many were blackened
    pub(crate) fn visit_objects_step(&mut self, types: &dyn TypeLayoutProvider, budget: usize) -> usize {
        self.marker.flush_more();
        let mut visited = 0;
        while visited < budget {
            let Some(obj) = self.marker.pop() else {
                break;
            };
            // SAFETY: only live old objects are ever queued
            if unsafe { self.visit(types, obj) } {
                visited += 1;
            }
        }
        visited
    }

    /// Drain the mark stack completely
    pub(crate) fn visit_all_objects(&mut self, types: &dyn TypeLayoutProvider) -> usize {
        let mut visited = 0;
        loop {
            self.marker.flush_more();
            let Some(obj) = self.marker.pop() else {
                return visited;
            };
            // SAFETY: as in visit_objects_step
            if unsafe { self.visit(types, obj) } {
                visited += 1;
            }
        }
    }

    /// Blacken `obj` and queue its white children
    ///
    /// Returns `false` when there was nothing to do.
    unsafe fn visit(&mut self, types: &dyn TypeLayoutProvider, obj: usize) -> bool {
        let hdr = header(obj);
        if hdr.has(GCFLAG_VISITED | GCFLAG_NO_HEAP_PTRS) {
            return false;
        }
        debug_assert!(!self.nursery.contains(obj), "young object {:#x} reached the marker", obj);
        hdr.set(GCFLAG_VISITED);

        let info = info_or_abort(types, obj);
        let queue = &mut self.marker;
        info.for_each_ref(obj, |slot| {
            let child = read_word(slot);
            if child != 0 && !header(child).has(GCFLAG_VISITED | GCFLAG_NO_HEAP_PTRS) {
                queue.push(child);
            }
        });
        true
    }
}
