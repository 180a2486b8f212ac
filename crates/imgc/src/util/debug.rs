//! Debug Utilities - heap verifier
//!
//! [`Collector::verify_heap`] walks everything reachable from the roots and
//! checks the invariants the barriers and collections rely on. With
//! `GcConfig::verify_heap` set, debug builds run it after every minor
//! collection and every major step and abort on the first violation.

use crate::error::{fatal, GcError, Result};
use crate::gc::{Collector, GcState};
use crate::object::header::{
    header, GCFLAG_CARDS_SET, GCFLAG_FORWARDED, GCFLAG_HAS_CARDS, GCFLAG_NO_HEAP_PTRS, GCFLAG_OLD,
    GCFLAG_TRACK_YOUNG_PTRS, GCFLAG_VISITED,
};
use crate::util::read_word;
use indexmap::IndexSet;
use std::sync::Arc;

/// Debug formatter for memory addresses
pub fn format_address(address: usize) -> String {
    format!("0x{:016X}", address)
}

fn violation(message: String) -> GcError {
    GcError::InvariantViolation(message)
}

impl Collector {
    /// Verify the heap if configured to (debug builds only)
    pub(crate) fn maybe_verify(&mut self, after: &str) {
        if cfg!(debug_assertions) && self.config.verify_heap {
            if let Err(err) = self.verify_heap() {
                log::error!("heap verification after {} failed", after);
                fatal(err);
            }
        }
    }

    /// Check the invariants of every reachable object
    ///
    /// Returns the number of objects checked. Meant to run between
    /// collections; right after one it also proves that nothing reachable
    /// is left in the nursery.
    ///
    /// # Errors
    /// [`GcError::InvariantViolation`] describing the first broken invariant.
    pub fn verify_heap(&mut self) -> Result<usize> {
        self.verify_scratch.clear();
        self.walk_roots(
            Some(Self::verify_root),
            Some(Self::verify_root),
            Some(Self::verify_root),
            false,
        );

        let mut pending = std::mem::take(&mut self.verify_scratch);
        pending.extend(self.prebuilt_root_objects.iter().copied());
        pending.extend(self.finalizers.pending());
        pending.extend(self.old_objects_with_weakrefs.iter().copied());

        let types = Arc::clone(&self.types);
        let nursery_empty = self.nursery.reserved_bytes() == 0;
        let mut seen = IndexSet::new();

        while let Some(obj) = pending.pop() {
            if !seen.insert(obj) {
                continue;
            }
            // SAFETY: dereferences stay inside the nursery or objects the
            // walk already validated
            unsafe {
                let hdr = *header(obj);
                let young = self.nursery.contains(obj);
                if young && hdr.has(GCFLAG_FORWARDED) {
                    return Err(violation(format!(
                        "dangling reference to moved nursery object {}",
                        format_address(obj)
                    )));
                }
                if young && nursery_empty {
                    return Err(violation(format!(
                        "nursery object {} reachable after a minor collection",
                        format_address(obj)
                    )));
                }
                if !young && !hdr.has(GCFLAG_OLD) {
                    return Err(violation(format!(
                        "old object {} lacks the old flag",
                        format_address(obj)
                    )));
                }
                if hdr.has(GCFLAG_CARDS_SET) && !hdr.has(GCFLAG_HAS_CARDS) {
                    return Err(violation(format!(
                        "object {} has cards set but no card area",
                        format_address(obj)
                    )));
                }
                if self.state == GcState::Scanning && hdr.has(GCFLAG_VISITED) {
                    return Err(violation(format!(
                        "object {} still marked between cycles",
                        format_address(obj)
                    )));
                }

                let Some(info) = types.type_info(hdr.type_id()) else {
                    return Err(GcError::UnknownType {
                        type_id: hdr.type_id(),
                    });
                };
                let remembered = !hdr.has(GCFLAG_TRACK_YOUNG_PTRS) || hdr.has(GCFLAG_CARDS_SET);
                let mut bad_child = None;
                info.for_each_ref(obj, |slot| {
                    let child = read_word(slot);
                    if child == 0 {
                        return;
                    }
                    if hdr.has(GCFLAG_NO_HEAP_PTRS) || (!young && !remembered && self.nursery.contains(child)) {
                        bad_child.get_or_insert(child);
                    }
                    pending.push(child);
                });
                if let Some(child) = bad_child {
                    return Err(violation(format!(
                        "object {} references {} without being recorded by the write barrier",
                        format_address(obj),
                        format_address(child)
                    )));
                }
            }
        }

        log::trace!("heap verified: {} objects", seen.len());
        Ok(seen.len())
    }

    fn verify_root(gc: &mut Collector, slot: usize) {
        // SAFETY: root walkers report valid slots
        let obj = unsafe { read_word(slot) };
        if obj != 0 {
            gc.verify_scratch.push(obj);
        }
    }
}
