//! Large Object Space
//!
//! Objects above `small_request_threshold` (and every object tenured
//! directly because it is above `large_object_threshold`) get their own
//! raw allocation. Arrays that use card marking carry their card bytes in
//! front of the header:
//!
//! ```text
//! base                 obj
//! | card bytes (word-   | header | payload ...            |
//! |  aligned, zeroed)   |        |                        |
//! ```
//!
//! The card byte for card group `i` is at `obj - 1 - i`.

use crate::error::{GcError, Result};
use crate::util::zero_bytes;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy)]
struct RawBlock {
    base: usize,
    size: usize,
}

/// Registry of raw-allocated old objects
#[derive(Debug, Default)]
pub struct LargeObjectSpace {
    objects: IndexMap<usize, RawBlock>,
    sweep_queue: Vec<usize>,
    total_size: usize,
}

impl LargeObjectSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object of `size` bytes preceded by `card_bytes` zeroed bytes
    ///
    /// Returns the object address (past the card area). The object itself is
    /// zeroed only if `zero` is set.
    pub fn malloc(&mut self, card_bytes: usize, size: usize, zero: bool) -> Result<usize> {
        let total = card_bytes
            .checked_add(size)
            .ok_or(GcError::OutOfMemory {
                requested: usize::MAX,
                what: "large object",
            })?;
        let base = raw_malloc(total, zero)?;
        if !zero && card_bytes > 0 {
            // SAFETY: the card area is the start of a block we just allocated
            unsafe { zero_bytes(base, card_bytes) };
        }

        let obj = base + card_bytes;
        self.objects.insert(obj, RawBlock { base, size: total });
        self.total_size += total;
        Ok(obj)
    }

    /// Check if `obj` is a registered large object
    #[inline]
    pub fn contains(&self, obj: usize) -> bool {
        self.objects.contains_key(&obj)
    }

    /// Queue every current object for the coming sweep
    pub fn prepare_sweep(&mut self) {
        self.sweep_queue = self.objects.keys().copied().collect();
    }

    /// Sweep at most `max` queued objects
    ///
    /// `ok_to_keep` decides survival. Returns the number of objects examined
    /// and whether the queue is drained.
    pub fn sweep_step(
        &mut self,
        max: usize,
        mut ok_to_keep: impl FnMut(usize) -> bool,
    ) -> (usize, bool) {
        let mut examined = 0;
        while examined < max {
            let Some(obj) = self.sweep_queue.pop() else {
                break;
            };
            examined += 1;
            if ok_to_keep(obj) {
                continue;
            }
            if let Some(block) = self.objects.swap_remove(&obj) {
                self.total_size -= block.size;
                // SAFETY: `block` came from raw_malloc and is no longer registered
                unsafe { raw_free(block.base, block.size) };
            }
        }
        (examined, self.sweep_queue.is_empty())
    }

    /// Bytes held by raw allocations, card areas included
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of large objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Drop for LargeObjectSpace {
    fn drop(&mut self) {
        for (_, block) in self.objects.drain(..) {
            // SAFETY: every registered block came from raw_malloc
            unsafe { raw_free(block.base, block.size) };
        }
    }
}

// ============================================================================
// Platform allocation
// ============================================================================

#[cfg(unix)]
fn raw_malloc(size: usize, zero: bool) -> Result<usize> {
    // SAFETY: plain libc allocation, checked for null below
    let ptr = unsafe {
        if zero {
            libc::calloc(1, size)
        } else {
            libc::malloc(size)
        }
    };
    if ptr.is_null() {
        return Err(GcError::OutOfMemory {
            requested: size,
            what: "large object",
        });
    }
    Ok(ptr as usize)
}

#[cfg(unix)]
unsafe fn raw_free(base: usize, _size: usize) {
    libc::free(base as *mut libc::c_void);
}

#[cfg(not(unix))]
const RAW_ALIGN: usize = 16;

#[cfg(not(unix))]
fn raw_malloc(size: usize, zero: bool) -> Result<usize> {
    let oom = GcError::OutOfMemory {
        requested: size,
        what: "large object",
    };
    let layout = std::alloc::Layout::from_size_align(size.max(1), RAW_ALIGN).map_err(|_| oom)?;
    // SAFETY: layout has non-zero size
    let ptr = unsafe {
        if zero {
            std::alloc::alloc_zeroed(layout)
        } else {
            std::alloc::alloc(layout)
        }
    };
    if ptr.is_null() {
        return Err(GcError::OutOfMemory {
            requested: size,
            what: "large object",
        });
    }
    Ok(ptr as usize)
}

#[cfg(not(unix))]
unsafe fn raw_free(base: usize, size: usize) {
    if let Ok(layout) = std::alloc::Layout::from_size_align(size.max(1), RAW_ALIGN) {
        std::alloc::dealloc(base as *mut u8, layout);
    }
}
