//! Mutator interface - field access with the barriers applied
//!
//! Embedders that generate their own code emit the barrier calls inline.
//! Everyone else goes through these helpers, which pair each reference
//! store with the right barrier:
//!
//! ```rust,no_run
//! use imgc::mutator;
//! # fn demo(gc: &mut imgc::Collector, parent: usize, child: usize) {
//! unsafe { mutator::store_ref(gc, parent, 0, child) };
//! # }
//! ```
//!
//! All offsets are payload offsets, i.e. relative to the first byte after
//! the header.
//!
//! [`SharedCollector`] is the locking discipline for several mutator
//! threads: one lock around the whole collector, and every thread switches
//! to its own execution context before touching the heap.

use crate::allocator::nursery::ContextId;
use crate::gc::{info_or_abort, Collector};
use crate::object::header::HEADER_SIZE;
use crate::util::{read_word, write_word};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Store `value` into the reference field at `offset` of `obj`
///
/// # Safety
/// `obj` must be a live object with a reference field at `offset`, and
/// `value` 0 or a live object.
#[inline]
pub unsafe fn store_ref(gc: &mut Collector, obj: usize, offset: usize, value: usize) {
    gc.write_barrier(obj);
    write_word(obj + HEADER_SIZE + offset, value);
}

/// Read the word at payload `offset` of `obj`
///
/// # Safety
/// `obj` must be a live object at least `offset + WORD` payload bytes long.
#[inline]
pub unsafe fn load_ref(obj: usize, offset: usize) -> usize {
    read_word(obj + HEADER_SIZE + offset)
}

/// Store a non-reference word; no barrier needed
///
/// # Safety
/// Same as [`load_ref`], and the word must not be a reference field.
#[inline]
pub unsafe fn store_word(obj: usize, offset: usize, value: usize) {
    write_word(obj + HEADER_SIZE + offset, value);
}

/// Store a reference field WITHOUT the write barrier
///
/// Breaks the generational invariant when `obj` is old and `value` young:
/// the next minor collection will not update the field. Only for tests that
/// demonstrate exactly that.
///
/// # Safety
/// Same as [`store_ref`], and the caller accepts a corrupted heap.
#[doc(hidden)]
pub unsafe fn store_ref_unbarriered(obj: usize, offset: usize, value: usize) {
    write_word(obj + HEADER_SIZE + offset, value);
}

/// Store `value` into item `index` of a reference array
///
/// # Safety
/// `array` must be a live array whose items are single references, `index`
/// in bounds, and `value` 0 or a live object.
#[inline]
pub unsafe fn store_array_item(gc: &mut Collector, array: usize, index: usize, value: usize) {
    gc.write_barrier_from_array(array, index);
    write_word(item_address(gc, array, index), value);
}

/// Read item `index` of an array of words
///
/// # Safety
/// `array` must be a live array with at least `index + 1` items.
#[inline]
pub unsafe fn load_array_item(gc: &Collector, array: usize, index: usize) -> usize {
    read_word(item_address(gc, array, index))
}

/// Number of items of an array
///
/// # Safety
/// `array` must be a live array.
pub unsafe fn array_length(gc: &Collector, array: usize) -> usize {
    info_or_abort(gc.types().as_ref(), array).length(array)
}

unsafe fn item_address(gc: &Collector, array: usize, index: usize) -> usize {
    let info = info_or_abort(gc.types().as_ref(), array);
    debug_assert!(index < info.length(array), "index {} out of bounds", index);
    info.item_address(array, index).unwrap_or(array + HEADER_SIZE)
}

/// Copy `length` items between reference arrays
///
/// Uses the bulk barrier when it allows a raw copy, and falls back to one
/// barrier per item otherwise. Overlapping ranges in the same array work.
///
/// # Safety
/// Both arrays must be live reference arrays of the same item layout and
/// both ranges in bounds.
pub unsafe fn arraycopy(
    gc: &mut Collector,
    src: usize,
    dst: usize,
    src_start: usize,
    dst_start: usize,
    length: usize,
) {
    if length == 0 {
        return;
    }
    let (src_item, dst_item, item_size) = {
        let info = info_or_abort(gc.types().as_ref(), src);
        let size = match (info.item_address(src, 0), info.item_address(src, 1)) {
            (Some(a), Some(b)) => b - a,
            _ => return,
        };
        (
            info.item_address(src, src_start).unwrap_or(0),
            info.item_address(dst, dst_start).unwrap_or(0),
            size,
        )
    };

    if gc.writebarrier_before_copy(src, dst, src_start, dst_start, length) {
        std::ptr::copy(src_item as *const u8, dst_item as *mut u8, length * item_size);
        return;
    }

    // Manual copy keeping the order safe for overlapping ranges
    let indices: Box<dyn Iterator<Item = usize>> = if src == dst && dst_start > src_start {
        Box::new((0..length).rev())
    } else {
        Box::new(0..length)
    };
    for i in indices {
        let value = load_array_item(gc, src, src_start + i);
        store_array_item(gc, dst, dst_start + i, value);
    }
}

/// A collector shared by several mutator threads
///
/// ```rust,no_run
/// # use imgc::{Collector, mutator::SharedCollector};
/// # fn demo(gc: Collector, leaf: imgc::TypeId) {
/// let shared = SharedCollector::new(gc);
/// let worker = shared.clone();
/// std::thread::spawn(move || {
///     worker.with_context(1, |gc| gc.allocate(leaf, 8));
/// });
/// # }
/// ```
#[derive(Clone)]
pub struct SharedCollector {
    inner: Arc<Mutex<Collector>>,
}

impl SharedCollector {
    pub fn new(gc: Collector) -> Self {
        Self {
            inner: Arc::new(Mutex::new(gc)),
        }
    }

    /// Lock the collector without changing the active context
    pub fn lock(&self) -> MutexGuard<'_, Collector> {
        self.inner.lock()
    }

    /// Run `f` with the collector locked and `context` active
    pub fn with_context<R>(&self, context: ContextId, f: impl FnOnce(&mut Collector) -> R) -> R {
        let mut gc = self.inner.lock();
        gc.switch_thread_context(context);
        f(&mut gc)
    }
}

impl std::fmt::Debug for SharedCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCollector").finish_non_exhaustive()
    }
}
