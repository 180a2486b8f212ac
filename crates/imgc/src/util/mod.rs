//! Util Module - Shared Utilities
//!
//! Raw word access, alignment helpers and the debug-only heap verifier.

pub mod alignment;
pub mod debug;

pub use alignment::{Alignment, WORD};

/// Size constants
pub mod constants {
    /// 1 Kilobyte
    pub const KB: usize = 1024;
    /// 1 Megabyte
    pub const MB: usize = 1024 * 1024;
    /// 1 Gigabyte
    pub const GB: usize = 1024 * 1024 * 1024;
}

/// Read one word of managed memory
///
/// # Safety
/// `addr` must be a word-aligned address inside memory owned by the collector
/// (or a prebuilt object registered with it).
#[inline]
pub unsafe fn read_word(addr: usize) -> usize {
    (addr as *const usize).read()
}

/// Write one word of managed memory
///
/// # Safety
/// Same contract as [`read_word`].
#[inline]
pub unsafe fn write_word(addr: usize, value: usize) {
    (addr as *mut usize).write(value)
}

/// Zero `len` bytes starting at `addr`
///
/// # Safety
/// The whole range must be writable memory owned by the collector.
#[inline]
pub unsafe fn zero_bytes(addr: usize, len: usize) {
    std::ptr::write_bytes(addr as *mut u8, 0, len);
}

/// Copy `len` bytes between two non-overlapping ranges
///
/// # Safety
/// Both ranges must be valid and must not overlap.
#[inline]
pub unsafe fn copy_bytes(src: usize, dst: usize, len: usize) {
    std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
}
