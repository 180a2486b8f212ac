//! Relocate Module - Minor collection
//!
//! A minor collection empties the nursery by copying every reachable young
//! object into the old generation:
//!
//! 1. Rescan the set cards of large arrays
//! 2. Drag out everything the roots point to
//! 3. Drain the remembered set: old objects the barrier recorded, plus the
//!    objects just copied out, traced until nothing young is left
//! 4. Fix up young weakrefs
//! 5. Reset the nursery
//!
//! While a major cycle is marking, every object touched in steps 1-3 is
//! greyed, so the marker sees all edges the mutator created since the last
//! step.
//!
//! ```text
//!  nursery                         old generation
//! ┌────────────────┐              ┌───────────────┐
//! │ A ──► B        │   drag_out   │ A' ──► B'     │
//! │ fwd:A' fwd:B'  │ ───────────► │               │
//! └────────────────┘              └───────────────┘
//! ```

pub mod forwarding;

pub use forwarding::ShadowTable;

use crate::barrier::cards;
use crate::gc::{info_or_abort, Collector, GcState};
use crate::hooks::MinorCollectEvent;
use crate::logging::GcEvent;
use crate::object::header::{
    header, GCFLAG_CARDS_SET, GCFLAG_FORWARDED, GCFLAG_HAS_CARDS, GCFLAG_HAS_SHADOW,
    GCFLAG_NO_HEAP_PTRS, GCFLAG_OLD, GCFLAG_TRACK_YOUNG_PTRS, GCFLAG_VISITED,
};
use crate::object::layout::TypeLayoutProvider;
use crate::stats::timer::GcTimer;
use crate::util::{copy_bytes, read_word, write_word};
use forwarding::{forwarding_address, set_forwarding};
use std::sync::Arc;

impl Collector {
    /// Run one minor collection
    pub(crate) fn minor_collection(&mut self) {
        let timer = GcTimer::start();
        let types = Arc::clone(&self.types);
        self.counters.reset_minor();

        self.collect_cardrefs_to_nursery(&*types);
        self.collect_roots_in_nursery();
        self.collect_oldrefs_to_nursery(&*types);
        self.invalidate_young_weakrefs(&*types);

        let dead_shadows = self.shadows.clear();
        self.nursery.reset();
        self.counters.minor_collections += 1;

        self.maybe_verify("minor collection");

        let duration = timer.elapsed();
        self.counters.minor_pauses.record(duration.as_micros() as u64);
        let total_memory_used = self.old_generation_bytes();
        log::debug!(
            "minor collection #{}: {} objects promoted ({} bytes), {} cards, {} dead shadows in {:?}",
            self.counters.minor_collections,
            self.counters.last_minor_promoted_objects,
            self.counters.last_minor_promoted_bytes,
            self.counters.last_minor_cards_scanned,
            dead_shadows,
            duration,
        );
        self.logger.record(GcEvent::MinorCollection {
            promoted_objects: self.counters.last_minor_promoted_objects,
            promoted_bytes: self.counters.last_minor_promoted_bytes,
            total_memory_used,
            duration_us: duration.as_micros() as u64,
        });

        if self.hooks.is_gc_minor_enabled() {
            self.hooks.on_gc_minor(&MinorCollectEvent {
                duration,
                total_memory_used,
                pinned_objects: 0,
            });
        }
    }

    /// Trace the set cards of every array recorded by the array barrier
    fn collect_cardrefs_to_nursery(&mut self, types: &dyn TypeLayoutProvider) {
        let cpi = self.config.card_page_indices;
        let shift = self.config.card_page_shift();

        while let Some(array) = self.old_objects_with_cards_set.pop() {
            // SAFETY: only live old arrays with a card area are recorded
            unsafe {
                let hdr = header(array);
                debug_assert!(hdr.has(GCFLAG_HAS_CARDS));
                hdr.clear(GCFLAG_CARDS_SET);
                // a cleared flag means the whole array sits in the remembered set
                let trace = hdr.has(GCFLAG_TRACK_YOUNG_PTRS);

                let info = info_or_abort(types, array);
                let length = info.length(array);
                for byte_index in 0..cards::card_bytes_for_length(length, cpi) {
                    let byte = cards::read_card_byte(array, byte_index);
                    if byte == 0 {
                        continue;
                    }
                    cards::write_card_byte(array, byte_index, 0);
                    if !trace {
                        continue;
                    }
                    for bit in 0..8 {
                        if byte & (1 << bit) == 0 {
                            continue;
                        }
                        let start = (byte_index * 8 + bit) << shift;
                        if start >= length {
                            break;
                        }
                        let stop = (start + cpi).min(length);
                        info.for_each_item_ref(array, start, stop, |slot| self.trace_drag_out(slot));
                        self.counters.last_minor_cards_scanned += 1;
                    }
                }

                if self.state == GcState::Marking {
                    self.marker.grey(array);
                }
            }
        }
    }

    /// Copy out everything the roots reference
    fn collect_roots_in_nursery(&mut self) {
        let callback: fn(&mut Collector, usize) = if self.state == GcState::Marking {
            Self::drag_out_root_marking
        } else {
            Self::drag_out_root
        };
        self.walk_roots(Some(callback), Some(callback), None, true);
        for index in 0..self.scratch_roots.len() {
            let slot = &mut self.scratch_roots[index] as *mut usize as usize;
            callback(self, slot);
        }
    }

    fn drag_out_root(gc: &mut Collector, slot: usize) {
        // SAFETY: root walkers report valid slots
        unsafe { gc.trace_drag_out(slot) };
    }

    fn drag_out_root_marking(gc: &mut Collector, slot: usize) {
        // SAFETY: root walkers report valid slots
        unsafe {
            gc.trace_drag_out(slot);
            let obj = read_word(slot);
            if obj != 0 && !header(obj).has(GCFLAG_VISITED | GCFLAG_NO_HEAP_PTRS) {
                gc.marker.push_more(obj);
            }
        }
    }

    /// Drain the remembered set
    ///
    /// Copied-out objects with references are pushed here too, so this loop
    /// is also the transitive part of the minor collection.
    fn collect_oldrefs_to_nursery(&mut self, types: &dyn TypeLayoutProvider) {
        while let Some(obj) = self.old_objects_pointing_to_young.pop() {
            // SAFETY: the remembered set only holds live old objects
            unsafe {
                header(obj).set(GCFLAG_TRACK_YOUNG_PTRS);
                let info = info_or_abort(types, obj);
                info.for_each_ref(obj, |slot| self.trace_drag_out(slot));
                if self.state == GcState::Marking {
                    self.marker.grey(obj);
                }
            }
        }
    }

    /// Update `slot` if it references a young object, copying it out first
    ///
    /// # Safety
    /// `slot` must be a valid reference slot.
    pub(crate) unsafe fn trace_drag_out(&mut self, slot: usize) {
        let obj = read_word(slot);
        if obj == 0 || !self.nursery.contains(obj) {
            return;
        }
        if header(obj).has(GCFLAG_FORWARDED) {
            write_word(slot, forwarding_address(obj));
            return;
        }
        let copy = self.promote(obj);
        write_word(slot, copy);
    }

    /// Copy one young object into the old generation
    unsafe fn promote(&mut self, obj: usize) -> usize {
        let types = Arc::clone(&self.types);
        let info = info_or_abort(&*types, obj);
        let size = info.object_size(obj);
        let card_area = self.card_area_for(info, obj, size);
        let has_gc_pointers = info.has_gc_pointers();

        let hdr = header(obj);
        let copy = if hdr.has(GCFLAG_HAS_SHADOW) {
            match self.shadows.take(obj) {
                Some(shadow) => shadow,
                None => self.allocate_old_block(size, card_area),
            }
        } else {
            self.allocate_old_block(size, card_area)
        };

        copy_bytes(obj, copy, size);
        let new_hdr = header(copy);
        new_hdr.clear(GCFLAG_HAS_SHADOW);
        new_hdr.set(GCFLAG_OLD);
        if card_area > 0 {
            new_hdr.set(GCFLAG_HAS_CARDS);
        }
        set_forwarding(obj, copy);

        self.counters.last_minor_promoted_objects += 1;
        self.counters.last_minor_promoted_bytes += size;

        if has_gc_pointers {
            // TRACK_YOUNG_PTRS stays clear while the copy sits in the remembered set
            self.old_objects_pointing_to_young.push(copy);
        } else {
            new_hdr.set(GCFLAG_TRACK_YOUNG_PTRS);
            if self.state == GcState::Marking {
                self.marker.grey(copy);
            }
        }
        copy
    }
}
