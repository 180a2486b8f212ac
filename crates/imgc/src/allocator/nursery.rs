//! Nursery - bump allocation for young objects
//!
//! The nursery is one anonymous mapping carved into sub-blocks. Every
//! execution context owns a triple of cells `(free, top, block)` describing
//! the sub-block it is currently bumping through; switching contexts swaps
//! which triple the fast path uses. A sub-block is handed out at most once
//! between two minor collections, so contexts never share memory.
//!
//! ```text
//! base                                                         end
//! |  block(ctx 0)  |  block(ctx 1)  |  block(ctx 0)  |  ...free...  |
//!                                    ^block   ^free  ^top
//!                                                    ^next_block
//! ```

use crate::error::{GcError, Result};
use indexmap::IndexMap;
use memmap2::MmapMut;

/// Identifier of an execution context (a mutator thread)
pub type ContextId = u64;

/// The context that exists from collector creation on
pub const MAIN_CONTEXT: ContextId = 0;

/// Allocation cells of one execution context
///
/// All three are zero when the context holds no sub-block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NurseryCells {
    /// Next free byte
    pub free: usize,
    /// End of the current sub-block
    pub top: usize,
    /// Start of the current sub-block
    pub block: usize,
}

impl NurseryCells {
    /// Bytes left in the current sub-block
    #[inline]
    pub fn remaining(&self) -> usize {
        self.top - self.free
    }
}

/// Young generation space
pub struct Nursery {
    _map: MmapMut,
    base: usize,
    size: usize,
    block_size: usize,
    next_block: usize,
    contexts: IndexMap<ContextId, NurseryCells>,
    active: usize,
    active_id: ContextId,
}

impl Nursery {
    /// Map a nursery of `size` bytes handed out in `block_size` chunks
    pub fn new(size: usize, block_size: usize) -> Result<Self> {
        let mut map = MmapMut::map_anon(size).map_err(|source| GcError::MapFailed { size, source })?;
        let base = map.as_mut_ptr() as usize;

        let mut contexts = IndexMap::new();
        contexts.insert(MAIN_CONTEXT, NurseryCells::default());

        Ok(Self {
            _map: map,
            base,
            size,
            block_size: block_size.min(size),
            next_block: base,
            contexts,
            active: 0,
            active_id: MAIN_CONTEXT,
        })
    }

    /// First byte of the nursery
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Nursery size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sub-block size in bytes
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Check if `addr` points into the nursery
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.size
    }

    /// Bump-allocate `size` bytes in the active context's sub-block
    ///
    /// Returns `None` when the sub-block cannot hold the request. The memory
    /// is not zeroed.
    #[inline]
    pub fn try_bump(&mut self, size: usize) -> Option<usize> {
        let cells = &mut self.contexts[self.active];
        if cells.remaining() < size {
            return None;
        }
        let result = cells.free;
        cells.free += size;
        Some(result)
    }

    /// Give the active context a fresh sub-block able to hold `size` bytes
    ///
    /// The unused tail of the previous sub-block is abandoned until the next
    /// minor collection. Returns `false` when the nursery is exhausted.
    pub fn reserve_block(&mut self, size: usize) -> bool {
        let end = self.base + self.size;
        let start = self.next_block;
        let top = (start + self.block_size).min(end);
        if top - start < size {
            return false;
        }
        self.next_block = top;
        self.contexts[self.active] = NurseryCells {
            free: start,
            top,
            block: start,
        };
        true
    }

    /// Bytes handed out to contexts since the last reset
    pub fn reserved_bytes(&self) -> usize {
        self.next_block - self.base
    }

    /// Forget every sub-block; the whole nursery is free again
    pub fn reset(&mut self) {
        self.next_block = self.base;
        self.zero_nursery_pointers_in_all_threads();
    }

    /// Clear the cells of every context
    pub fn zero_nursery_pointers_in_all_threads(&mut self) {
        for cells in self.contexts.values_mut() {
            *cells = NurseryCells::default();
        }
    }

    // ========================================================================
    // Execution contexts
    // ========================================================================

    /// Register a context; no-op when it already exists
    pub fn register_context(&mut self, id: ContextId) {
        self.contexts.entry(id).or_default();
    }

    /// Make `id` the active context, registering it on first use
    ///
    /// Returns the previously active context.
    pub fn switch_context(&mut self, id: ContextId) -> ContextId {
        let previous = self.active_id;
        let entry = self.contexts.entry(id);
        self.active = entry.index();
        entry.or_default();
        self.active_id = id;
        previous
    }

    /// Drop a context's cells
    ///
    /// Its unused sub-block tail is simply lost until the next minor
    /// collection. The active context cannot be removed.
    pub fn remove_context(&mut self, id: ContextId) -> Result<()> {
        if id == self.active_id || self.contexts.shift_remove(&id).is_none() {
            return Err(GcError::UnknownContext(id));
        }
        self.active = self
            .contexts
            .get_index_of(&self.active_id)
            .ok_or(GcError::UnknownContext(self.active_id))?;
        Ok(())
    }

    /// The active context
    #[inline]
    pub fn current_context(&self) -> ContextId {
        self.active_id
    }

    /// Cells of a context, if registered
    pub fn cells(&self, id: ContextId) -> Option<NurseryCells> {
        self.contexts.get(&id).copied()
    }

    /// Number of registered contexts
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

impl std::fmt::Debug for Nursery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nursery")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &self.size)
            .field("block_size", &self.block_size)
            .field("reserved", &self.reserved_bytes())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}
