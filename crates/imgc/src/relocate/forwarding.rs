//! Forwarding - where a copied nursery object went
//!
//! A nursery object that survived a minor collection is overwritten in
//! place: its header gets `GCFLAG_FORWARDED` and its first payload word the
//! address of the old copy. The nursery is reset right after, so this data
//! only lives for the duration of one minor collection.
//!
//! The shadow table maps young objects whose identity was requested to the
//! old block reserved for them. A shadow becomes the object's copy when it
//! survives; when it does not, the block is garbage for the next sweep.

use crate::object::header::{header, HEADER_SIZE, GCFLAG_FORWARDED};
use crate::util::{read_word, write_word};
use indexmap::IndexMap;

/// Check if a nursery object was already copied
///
/// # Safety
/// `obj` must be a nursery object during a minor collection.
#[inline]
pub unsafe fn is_forwarded(obj: usize) -> bool {
    header(obj).has(GCFLAG_FORWARDED)
}

/// New address of a forwarded object
///
/// # Safety
/// `obj` must be forwarded.
#[inline]
pub unsafe fn forwarding_address(obj: usize) -> usize {
    read_word(obj + HEADER_SIZE)
}

/// Mark `obj` as copied to `new_addr`
///
/// # Safety
/// `obj` must be a nursery object of at least `MIN_OBJECT_SIZE` bytes whose
/// content has already been copied.
#[inline]
pub unsafe fn set_forwarding(obj: usize, new_addr: usize) {
    header(obj).set(GCFLAG_FORWARDED);
    write_word(obj + HEADER_SIZE, new_addr);
}

/// Young object to reserved old block
#[derive(Debug, Default)]
pub struct ShadowTable {
    entries: IndexMap<usize, usize>,
}

impl ShadowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the shadow of `young`
    pub fn insert(&mut self, young: usize, shadow: usize) {
        self.entries.insert(young, shadow);
    }

    /// Shadow of `young`, if any
    pub fn get(&self, young: usize) -> Option<usize> {
        self.entries.get(&young).copied()
    }

    /// Take the shadow of `young` out of the table
    pub fn take(&mut self, young: usize) -> Option<usize> {
        self.entries.swap_remove(&young)
    }

    /// Forget all shadows; the ones still listed belonged to dead objects
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::header::{init_header, ObjectHeader};

    #[test]
    fn test_forwarding_roundtrip() {
        let mut storage = [0usize; 3];
        let obj = storage.as_mut_ptr() as usize;
        unsafe {
            init_header(obj, ObjectHeader::new(4));
            assert!(!is_forwarded(obj));
            set_forwarding(obj, 0x1000);
            assert!(is_forwarded(obj));
            assert_eq!(forwarding_address(obj), 0x1000);
            assert_eq!(header(obj).type_id(), 4);
        }
    }

    #[test]
    fn test_shadow_table() {
        let mut table = ShadowTable::new();
        table.insert(0x10, 0x900);
        table.insert(0x20, 0x910);
        assert_eq!(table.get(0x10), Some(0x900));
        assert_eq!(table.take(0x10), Some(0x900));
        assert_eq!(table.take(0x10), None);
        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
    }
}
