//! Object Header - Metadata for GC-managed objects
//!
//! Object Header Layout (one 64-bit word):
//! ┌─────────────────────────────────────────┐
//! │  Bits 0-31:  type id                    │
//! │  Bit 32:     TRACK_YOUNG_PTRS           │  <- write-barrier gate
//! │  Bit 33:     NO_HEAP_PTRS               │  <- prebuilt, never written
//! │  Bit 34:     VISITED                    │  <- major marking
//! │  Bit 35:     HAS_SHADOW                 │  <- id() taken while young
//! │  Bit 36:     HAS_CARDS                  │  <- card bytes precede header
//! │  Bit 37:     CARDS_SET                  │  <- on the cards-set list
//! │  Bit 38:     FORWARDED                  │  <- nursery copy moved away
//! │  Bit 39:     OLD                        │  <- outside the nursery
//! └─────────────────────────────────────────┘
//!
//! The object address is the address of its header; fields start right
//! after it. A forwarded nursery object keeps its new address in the first
//! field word, which is why no object is smaller than two words.

use crate::util::WORD;

/// Size of object header in bytes
pub const HEADER_SIZE: usize = 8;

/// Smallest object, header included
pub const MIN_OBJECT_SIZE: usize = HEADER_SIZE + WORD;

/// Type id stored in the low half of the header
pub type TypeId = u32;

const TYPE_ID_MASK: u64 = 0xFFFF_FFFF;

/// Set on every old object whose next pointer store must be recorded
pub const GCFLAG_TRACK_YOUNG_PTRS: u64 = 1 << 32;
/// Set on prebuilt objects that were never written through the barrier
pub const GCFLAG_NO_HEAP_PTRS: u64 = 1 << 33;
/// Mark bit of the current major cycle
pub const GCFLAG_VISITED: u64 = 1 << 34;
/// Young object whose old-generation address is already reserved
pub const GCFLAG_HAS_SHADOW: u64 = 1 << 35;
/// Raw-allocated array with card bytes in front of the header
pub const GCFLAG_HAS_CARDS: u64 = 1 << 36;
/// At least one card is set; the object is on the cards-set list
pub const GCFLAG_CARDS_SET: u64 = 1 << 37;
/// Nursery object already copied out; new address in the first field
pub const GCFLAG_FORWARDED: u64 = 1 << 38;
/// Object lives outside the nursery
pub const GCFLAG_OLD: u64 = 1 << 39;

/// Object Header
///
/// Every GC-managed object starts with this header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    word: u64,
}

impl ObjectHeader {
    /// Header of a fresh nursery object
    #[inline]
    pub fn new(type_id: TypeId) -> Self {
        Self {
            word: type_id as u64,
        }
    }

    /// Header with explicit flags
    #[inline]
    pub fn with_flags(type_id: TypeId, flags: u64) -> Self {
        Self {
            word: (type_id as u64) | (flags & !TYPE_ID_MASK),
        }
    }

    /// Get type id
    #[inline]
    pub fn type_id(&self) -> TypeId {
        (self.word & TYPE_ID_MASK) as TypeId
    }

    /// Get all flag bits
    #[inline]
    pub fn flags(&self) -> u64 {
        self.word & !TYPE_ID_MASK
    }

    /// Check if any of the given flags is set
    #[inline]
    pub fn has(&self, flags: u64) -> bool {
        self.word & flags != 0
    }

    /// Set flags
    #[inline]
    pub fn set(&mut self, flags: u64) {
        self.word |= flags;
    }

    /// Clear flags
    #[inline]
    pub fn clear(&mut self, flags: u64) {
        self.word &= !flags;
    }

    /// Raw header word
    #[inline]
    pub fn raw(&self) -> u64 {
        self.word
    }
}

/// Get the header of an object
///
/// # Safety
/// `obj` must be the address of a live object (or of a forwarded nursery
/// object during a minor collection).
#[inline]
pub unsafe fn header<'a>(obj: usize) -> &'a mut ObjectHeader {
    &mut *(obj as *mut ObjectHeader)
}

/// Write a fresh header at `obj`
///
/// # Safety
/// `obj` must point to at least `HEADER_SIZE` writable bytes.
#[inline]
pub unsafe fn init_header(obj: usize, value: ObjectHeader) {
    (obj as *mut ObjectHeader).write(value);
}

/// Get object data start (after header)
#[inline]
pub fn data_start(obj: usize) -> usize {
    obj + HEADER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_round_trip() {
        let header = ObjectHeader::new(0xABCD);
        assert_eq!(header.type_id(), 0xABCD);
        assert_eq!(header.flags(), 0);
    }

    #[test]
    fn test_flags_do_not_touch_type_id() {
        let mut header = ObjectHeader::new(u32::MAX);
        header.set(GCFLAG_VISITED | GCFLAG_OLD);
        assert_eq!(header.type_id(), u32::MAX);
        assert!(header.has(GCFLAG_VISITED));
        assert!(header.has(GCFLAG_OLD));
        assert!(!header.has(GCFLAG_TRACK_YOUNG_PTRS));

        header.clear(GCFLAG_VISITED);
        assert!(!header.has(GCFLAG_VISITED));
        assert!(header.has(GCFLAG_OLD));
        assert_eq!(header.type_id(), u32::MAX);
    }

    #[test]
    fn test_with_flags_ignores_low_bits() {
        let header = ObjectHeader::with_flags(3, GCFLAG_TRACK_YOUNG_PTRS | 0xFF);
        assert_eq!(header.type_id(), 3);
        assert_eq!(header.flags(), GCFLAG_TRACK_YOUNG_PTRS);
    }

    #[test]
    fn test_header_in_memory() {
        let mut storage = [0u64; 2];
        let obj = storage.as_mut_ptr() as usize;
        unsafe {
            init_header(obj, ObjectHeader::with_flags(9, GCFLAG_OLD));
            header(obj).set(GCFLAG_HAS_CARDS);
            assert_eq!(header(obj).type_id(), 9);
            assert!(header(obj).has(GCFLAG_HAS_CARDS));
        }
        assert_eq!(data_start(obj), obj + HEADER_SIZE);
        assert_eq!(storage[0] >> 32, (GCFLAG_OLD | GCFLAG_HAS_CARDS) >> 32);
    }
}
