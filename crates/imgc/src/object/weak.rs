//! Weak References Support
//!
//! A weakref is an object whose layout is [`Layout::WeakRef`]: one word that
//! the collector does not trace. When the referent dies the word is cleared.
//!
//! Weakrefs are always allocated young. Every minor collection walks the
//! young weakrefs: dead ones are forgotten, surviving ones get their target
//! forwarded (or cleared) and move to the old list. The old list is
//! processed once per major cycle, when marking is complete.
//!
//! [`Layout::WeakRef`]: crate::object::Layout::WeakRef

use crate::gc::Collector;
use crate::object::header::{header, TypeId, GCFLAG_FORWARDED, GCFLAG_NO_HEAP_PTRS, GCFLAG_VISITED};
use crate::object::layout::TypeLayoutProvider;
use crate::relocate::forwarding::forwarding_address;
use crate::util::{read_word, write_word};

impl Collector {
    /// Allocate a weakref of type `type_id` pointing at `target`
    ///
    /// `target` may be 0. The allocation may collect, so `target` is held in
    /// a scratch root meanwhile and the weakref receives its current
    /// address. The weakref is young, so no barrier is needed for the
    /// initial store.
    ///
    /// # Safety
    /// `target` must be 0 or a live object of this collector.
    pub unsafe fn allocate_weakref(&mut self, type_id: TypeId, target: usize) -> usize {
        let (size, is_weakref) = {
            let info = self.type_info_or_abort(type_id);
            (info.fixed_payload(), info.is_weakref())
        };
        debug_assert!(is_weakref, "type {} is not a weakref type", type_id);

        self.scratch_roots.push(target);
        let weakref = self.allocate(type_id, size);
        let target = self.scratch_roots.pop().unwrap_or(0);
        let types = std::sync::Arc::clone(&self.types);
        if let Some(slot) = types.info_of(weakref).and_then(|info| info.weakptr_slot(weakref)) {
            write_word(slot, target);
        }
        weakref
    }

    /// Read the target of a weakref (0 once the target died)
    ///
    /// # Safety
    /// `weakref` must be a live weakref of this collector.
    pub unsafe fn weakref_target(&self, weakref: usize) -> usize {
        match self.types.info_of(weakref).and_then(|info| info.weakptr_slot(weakref)) {
            Some(slot) => read_word(slot),
            None => 0,
        }
    }

    /// Update the young weakrefs after their survivors were copied out
    pub(crate) fn invalidate_young_weakrefs(&mut self, types: &dyn TypeLayoutProvider) {
        let young = std::mem::take(&mut self.young_objects_with_weakrefs);
        let mut cleared = 0;

        for weakref in young {
            // SAFETY: the nursery has not been reset yet, so forwarding data
            // of both the weakref and its target is still readable
            unsafe {
                if !header(weakref).has(GCFLAG_FORWARDED) {
                    continue;
                }
                let copy = forwarding_address(weakref);
                let Some(slot) = types.info_of(copy).and_then(|info| info.weakptr_slot(copy)) else {
                    continue;
                };

                let target = read_word(slot);
                if target != 0 && self.nursery.contains(target) {
                    if header(target).has(GCFLAG_FORWARDED) {
                        write_word(slot, forwarding_address(target));
                    } else {
                        write_word(slot, 0);
                        cleared += 1;
                    }
                }
                self.old_objects_with_weakrefs.push(copy);
            }
        }

        if cleared > 0 {
            log::trace!("minor collection cleared {} weakrefs", cleared);
        }
        self.counters.weakrefs_cleared += cleared;
    }

    /// Drop dead old weakrefs and clear the ones whose target was not marked
    pub(crate) fn invalidate_old_weakrefs(&mut self, types: &dyn TypeLayoutProvider) -> usize {
        let survives = |obj: usize| unsafe { header(obj).has(GCFLAG_VISITED | GCFLAG_NO_HEAP_PTRS) };
        let mut cleared = 0;

        self.old_objects_with_weakrefs.retain(|&weakref| {
            if !survives(weakref) {
                return false;
            }
            // SAFETY: marked objects are live
            unsafe {
                if let Some(slot) = types.info_of(weakref).and_then(|info| info.weakptr_slot(weakref)) {
                    let target = read_word(slot);
                    if target != 0 && !survives(target) {
                        write_word(slot, 0);
                        cleared += 1;
                    }
                }
            }
            true
        });

        self.counters.weakrefs_cleared += cleared;
        cleared
    }
}
