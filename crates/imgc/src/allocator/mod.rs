//! Allocator Module - Memory Allocation Strategies
//!
//! Where a new object goes:
//!
//! - **Nursery**: everything by default, bump-allocated in the active
//!   context's sub-block
//! - **Arenas**: small old objects (promoted, or allocated old directly)
//! - **Raw allocations**: old objects above `small_request_threshold`, with
//!   a card area in front of large reference arrays
//!
//! Objects go straight to the old generation when they are larger than
//! `large_object_threshold` or when their type has a finalizer.
//!
//! ## Allocation Flow
//!
//! 1. Bump in the current sub-block
//! 2. Sub-block full -> take the next sub-block
//! 3. Nursery exhausted -> minor collection (plus a major step if due),
//!    then retry; a fresh nursery always fits the request

pub mod arena;
pub mod large;
pub mod nursery;

pub use arena::ArenaCollection;
pub use large::LargeObjectSpace;
pub use nursery::{ContextId, Nursery, NurseryCells, MAIN_CONTEXT};

use crate::barrier::cards;
use crate::error::{fatal, GcError};
use crate::gc::{Collector, GcState};
use crate::object::header::{
    init_header, ObjectHeader, TypeId, GCFLAG_HAS_CARDS, GCFLAG_OLD, GCFLAG_TRACK_YOUNG_PTRS,
    GCFLAG_VISITED,
};
use crate::object::layout::TypeInfo;
use crate::or_fatal;
use crate::util::{write_word, zero_bytes};

impl Collector {
    /// Allocate a zeroed object of a fixed-size type
    ///
    /// `payload` is the size in bytes after the header. Never fails: running
    /// out of memory aborts the process.
    pub fn allocate(&mut self, type_id: TypeId, payload: usize) -> usize {
        self.malloc_fixedsize(type_id, payload, true)
    }

    /// Like [`Collector::allocate`] but the payload is left uninitialized
    ///
    /// The caller must write every reference field before the next
    /// allocation or collection.
    pub fn allocate_nonzeroed(&mut self, type_id: TypeId, payload: usize) -> usize {
        self.malloc_fixedsize(type_id, payload, false)
    }

    /// Allocate a zeroed array of `length` items
    pub fn allocate_varsize(&mut self, type_id: TypeId, length: usize) -> usize {
        self.malloc_varsize(type_id, length, true)
    }

    /// Like [`Collector::allocate_varsize`] but items are left uninitialized
    pub fn allocate_varsize_nonzeroed(&mut self, type_id: TypeId, length: usize) -> usize {
        self.malloc_varsize(type_id, length, false)
    }

    fn malloc_fixedsize(&mut self, type_id: TypeId, payload: usize, zero: bool) -> usize {
        let (has_finalizer, is_weakref) = {
            let info = self.type_info_or_abort(type_id);
            debug_assert!(!info.is_varsize(), "type {} is an array type", info.name);
            debug_assert!(payload >= info.fixed_payload());
            (info.has_finalizer, info.is_weakref())
        };
        let total = TypeInfo::total_size_for_payload(payload);

        if has_finalizer {
            let obj = self.allocate_old(type_id, total, 0, zero);
            self.finalizers.register(obj);
            return obj;
        }
        if total > self.config.large_object_threshold {
            if is_weakref {
                fatal(GcError::InvariantViolation(format!(
                    "weakref type {} does not fit in the nursery",
                    type_id
                )));
            }
            return self.allocate_old(type_id, total, 0, zero);
        }

        let obj = self.allocate_young(type_id, total, zero);
        if is_weakref {
            self.young_objects_with_weakrefs.push(obj);
        }
        obj
    }

    fn malloc_varsize(&mut self, type_id: TypeId, length: usize, zero: bool) -> usize {
        let (total, has_finalizer, card_area) = {
            let info = self.type_info_or_abort(type_id);
            debug_assert!(info.is_varsize(), "type {} is not an array type", info.name);
            let total = match info.varsize_total_size(length) {
                Some(total) => total,
                None => fatal(GcError::OutOfMemory {
                    requested: usize::MAX,
                    what: "array",
                }),
            };
            let card_area = if total > self.config.large_object_threshold {
                self.card_area_for_length(info, length, total)
            } else {
                0
            };
            (total, info.has_finalizer, card_area)
        };

        let obj = if has_finalizer || total > self.config.large_object_threshold {
            let obj = self.allocate_old(type_id, total, card_area, zero);
            if has_finalizer {
                self.finalizers.register(obj);
            }
            obj
        } else {
            self.allocate_young(type_id, total, zero)
        };

        if let Some(slot) = self.type_info_or_abort(type_id).length_slot(obj) {
            // SAFETY: the length word is inside the object just allocated
            unsafe { write_word(slot, length) };
        }
        obj
    }

    /// Bump-allocate a young object, collecting when the nursery is full
    fn allocate_young(&mut self, type_id: TypeId, total: usize, zero: bool) -> usize {
        let obj = match self.nursery.try_bump(total) {
            Some(obj) => obj,
            None => self.collect_and_reserve(total),
        };
        // SAFETY: `obj` is a fresh nursery block of `total` bytes
        unsafe {
            if zero {
                zero_bytes(obj, total);
            }
            init_header(obj, ObjectHeader::new(type_id));
        }
        obj
    }

    /// Slow path: next sub-block, or a minor collection when there is none
    #[inline(never)]
    fn collect_and_reserve(&mut self, total: usize) -> usize {
        if self.nursery.reserve_block(total) {
            if let Some(obj) = self.nursery.try_bump(total) {
                return obj;
            }
        }

        self.minor_collection_with_major_progress(0);

        if self.nursery.reserve_block(total) {
            if let Some(obj) = self.nursery.try_bump(total) {
                return obj;
            }
        }
        fatal(GcError::OutOfMemory {
            requested: total,
            what: "nursery",
        })
    }

    /// Allocate an object directly in the old generation
    fn allocate_old(&mut self, type_id: TypeId, total: usize, card_area: usize, zero: bool) -> usize {
        let raw = total > self.config.small_request_threshold || card_area > 0;
        if raw && self.threshold_reached(total + card_area) {
            self.minor_collection_with_major_progress(total + card_area + self.config.nursery_size / 2);
        }

        let obj = self.allocate_old_block(total, card_area);
        let mut flags = GCFLAG_OLD | GCFLAG_TRACK_YOUNG_PTRS;
        if card_area > 0 {
            flags |= GCFLAG_HAS_CARDS;
        }
        if self.state == GcState::Marking {
            flags |= GCFLAG_VISITED;
        }
        // SAFETY: fresh block of `total` bytes
        unsafe {
            if zero {
                zero_bytes(obj, total);
            }
            init_header(obj, ObjectHeader::with_flags(type_id, flags));
        }
        obj
    }

    /// Get an old block without a header; never triggers a collection
    pub(crate) fn allocate_old_block(&mut self, size: usize, card_area: usize) -> usize {
        if size <= self.config.small_request_threshold && card_area == 0 {
            or_fatal!(self.arenas.malloc(size))
        } else {
            or_fatal!(self.large.malloc(card_area, size, false))
        }
    }

    /// Card area an old copy of `obj` needs
    ///
    /// # Safety
    /// `obj` must be a live object of type `info`.
    pub(crate) unsafe fn card_area_for(&self, info: &TypeInfo, obj: usize, size: usize) -> usize {
        if !info.has_gc_items() {
            return 0;
        }
        self.card_area_for_length(info, info.length(obj), size)
    }

    fn card_area_for_length(&self, info: &TypeInfo, length: usize, size: usize) -> usize {
        if self.config.card_page_indices == 0
            || !info.has_gc_items()
            || size <= self.config.small_request_threshold
        {
            return 0;
        }
        cards::card_area_size(length, self.config.card_page_indices)
    }
}
