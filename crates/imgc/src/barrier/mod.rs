//! Barrier Module - Generational and incremental write barriers
//!
//! Every store of a reference into a heap object goes through one of the
//! barriers below before the store happens. The barriers are value-agnostic:
//! they never look at the reference being written, only at the target's
//! header, so a single flag test is the whole fast path.
//!
//! `GCFLAG_TRACK_YOUNG_PTRS` set on an old object means "not yet recorded".
//! The first barrier hit records the object and clears the flag, so later
//! stores into the same object cost one test until the next minor
//! collection re-arms it. The same record serves both purposes:
//!
//! - a minor collection uses it to find old-to-young references
//! - while marking, a minor collection greys every recorded object so the
//!   marker revisits whatever the mutator stored into already-visited ones
//!
//! Large arrays with cards record single cards instead of the whole object.

pub mod cards;

use crate::gc::{Collector, GcState};
use crate::object::header::{
    header, GCFLAG_CARDS_SET, GCFLAG_HAS_CARDS, GCFLAG_NO_HEAP_PTRS, GCFLAG_TRACK_YOUNG_PTRS,
};

impl Collector {
    /// Barrier before storing a reference into a field of `obj`
    ///
    /// # Safety
    /// `obj` must be a live object of this collector or a prebuilt object.
    #[inline]
    pub unsafe fn write_barrier(&mut self, obj: usize) {
        if header(obj).has(GCFLAG_TRACK_YOUNG_PTRS) {
            self.remember_young_pointer(obj);
        }
    }

    /// Barrier before storing a reference into item `index` of array `array`
    ///
    /// # Safety
    /// `array` must be a live array of this collector and `index` in bounds.
    #[inline]
    pub unsafe fn write_barrier_from_array(&mut self, array: usize, index: usize) {
        let hdr = header(array);
        if !hdr.has(GCFLAG_TRACK_YOUNG_PTRS) {
            return;
        }
        if self.config.card_page_indices == 0 || !hdr.has(GCFLAG_HAS_CARDS) {
            self.remember_young_pointer(array);
            return;
        }

        cards::set_card(array, index, self.config.card_page_shift());
        if !hdr.has(GCFLAG_CARDS_SET) {
            hdr.set(GCFLAG_CARDS_SET);
            self.old_objects_with_cards_set.push(array);
        }
    }

    /// Slow path shared by both barriers
    #[inline(never)]
    pub(crate) unsafe fn remember_young_pointer(&mut self, obj: usize) {
        let hdr = header(obj);
        if hdr.has(GCFLAG_NO_HEAP_PTRS) {
            hdr.clear(GCFLAG_NO_HEAP_PTRS);
            self.prebuilt_root_objects.push(obj);
        }
        self.old_objects_pointing_to_young.push(obj);
        hdr.clear(GCFLAG_TRACK_YOUNG_PTRS);
    }

    /// Barrier before copying `length` items from `src[src_start..]` to
    /// `dst[dst_start..]`
    ///
    /// Returns `true` when the barrier work is done and the caller may copy
    /// the items raw. `false` means the caller must store every item through
    /// [`Collector::write_barrier_from_array`].
    ///
    /// # Safety
    /// Both arrays must be live arrays of this collector and both ranges in
    /// bounds.
    pub unsafe fn writebarrier_before_copy(
        &mut self,
        src: usize,
        dst: usize,
        src_start: usize,
        dst_start: usize,
        length: usize,
    ) -> bool {
        let source_hdr = *header(src);
        let dest_hdr = header(dst);
        if !dest_hdr.has(GCFLAG_TRACK_YOUNG_PTRS) {
            return true;
        }

        if self.state == GcState::Marking {
            // dst may already be visited and src may hold unvisited objects
            self.remember_young_pointer(dst);
            return true;
        }

        // heap references copied into a prebuilt object make it a root
        if dest_hdr.has(GCFLAG_NO_HEAP_PTRS) && !source_hdr.has(GCFLAG_NO_HEAP_PTRS) {
            dest_hdr.clear(GCFLAG_NO_HEAP_PTRS);
            self.prebuilt_root_objects.push(dst);
        }

        if self.config.card_page_indices > 0 && source_hdr.has(GCFLAG_HAS_CARDS) {
            if !source_hdr.has(GCFLAG_TRACK_YOUNG_PTRS) {
                return false;
            }
            if !source_hdr.has(GCFLAG_CARDS_SET) {
                return true;
            }
            if !dest_hdr.has(GCFLAG_HAS_CARDS) || src_start != 0 || dst_start != 0 {
                return false;
            }
            self.manually_copy_card_bits(src, dst, length);
            return true;
        }

        if !source_hdr.has(GCFLAG_TRACK_YOUNG_PTRS) {
            self.old_objects_pointing_to_young.push(dst);
            dest_hdr.clear(GCFLAG_TRACK_YOUNG_PTRS);
        }
        true
    }

    /// OR the card bits covering the first `length` items of `src` into `dst`
    unsafe fn manually_copy_card_bits(&mut self, src: usize, dst: usize, length: usize) {
        let nbytes = cards::card_bytes_for_length(length, self.config.card_page_indices);
        let mut any = 0u8;
        for i in 0..nbytes {
            let byte = cards::read_card_byte(src, i);
            any |= byte;
            cards::write_card_byte(dst, i, cards::read_card_byte(dst, i) | byte);
        }

        let dest_hdr = header(dst);
        if any != 0 && !dest_hdr.has(GCFLAG_CARDS_SET) {
            dest_hdr.set(GCFLAG_CARDS_SET);
            self.old_objects_with_cards_set.push(dst);
        }
    }
}
