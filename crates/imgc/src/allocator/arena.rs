//! Arena Collection - size-classed pages for small old objects
//!
//! Old objects up to `small_request_threshold` bytes live in fixed-size
//! blocks. Memory is mapped in arenas, each arena is cut into pages, and
//! every page serves a single block size.
//!
//! ```text
//! Arena (arena_size)
//! ┌────────┬────────┬────────┬────────┐
//! │ page   │ page   │ page   │ unused │
//! │ 16 B   │ 48 B   │ 16 B   │        │
//! └────────┴────────┴────────┴────────┘
//! ```
//!
//! Page metadata lives in a side table, so blocks start right at the page
//! address and an object never shares a word with allocator bookkeeping.
//!
//! Sweeping is incremental: [`ArenaCollection::mass_free_prepare`] snapshots
//! every page in use, then [`ArenaCollection::mass_free_incremental`] walks
//! the snapshot a bounded number of pages at a time. Pages allocated after
//! the snapshot are left alone until the next cycle.

use crate::error::{GcError, Result};
use crate::object::header::MIN_OBJECT_SIZE;
use crate::util::{Alignment, WORD};
use indexmap::IndexMap;
use memmap2::MmapMut;

/// One page: blocks of a single size
#[derive(Debug)]
struct Page {
    addr: usize,
    arena: usize,
    block_size: usize,
    nblocks: usize,
    next_uninit: usize,
    free: Vec<u32>,
    allocated: Vec<u64>,
    nallocated: usize,
}

impl Page {
    fn new(addr: usize, arena: usize, page_size: usize, block_size: usize) -> Self {
        let nblocks = page_size / block_size;
        Self {
            addr,
            arena,
            block_size,
            nblocks,
            next_uninit: 0,
            free: Vec::new(),
            allocated: vec![0; nblocks.div_ceil(64)],
            nallocated: 0,
        }
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.free.is_empty() && self.next_uninit == self.nblocks
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.nallocated == 0
    }

    #[inline]
    fn is_allocated(&self, index: usize) -> bool {
        self.allocated[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    fn block_addr(&self, index: usize) -> usize {
        self.addr + index * self.block_size
    }

    fn alloc(&mut self) -> Option<usize> {
        let index = match self.free.pop() {
            Some(index) => index as usize,
            None if self.next_uninit < self.nblocks => {
                self.next_uninit += 1;
                self.next_uninit - 1
            }
            None => return None,
        };
        self.allocated[index / 64] |= 1 << (index % 64);
        self.nallocated += 1;
        Some(self.block_addr(index))
    }

    fn free_block(&mut self, index: usize) {
        self.allocated[index / 64] &= !(1 << (index % 64));
        self.nallocated -= 1;
        self.free.push(index as u32);
    }
}

/// One mapped arena
struct Arena {
    _map: MmapMut,
    base: usize,
    npages: usize,
    free_pages: Vec<usize>,
    next_uninit_page: usize,
}

impl Arena {
    fn nfree_pages(&self) -> usize {
        self.free_pages.len() + (self.npages - self.next_uninit_page)
    }

    fn is_completely_free(&self) -> bool {
        self.nfree_pages() == self.npages
    }

    fn take_page(&mut self, page_size: usize) -> Option<usize> {
        if let Some(page) = self.free_pages.pop() {
            return Some(page);
        }
        if self.next_uninit_page < self.npages {
            self.next_uninit_page += 1;
            return Some(self.base + (self.next_uninit_page - 1) * page_size);
        }
        None
    }
}

/// Pages of one block size
#[derive(Default)]
struct SizeClass {
    partial: Vec<Page>,
    full: Vec<Page>,
    to_sweep: Vec<Page>,
}

/// Allocator for small old objects
pub struct ArenaCollection {
    arena_size: usize,
    page_size: usize,
    small_request_threshold: usize,
    arenas: IndexMap<usize, Arena>,
    current_arena: Option<usize>,
    size_classes: Vec<SizeClass>,
    total_memory_used: usize,
    peak_memory_used: usize,
    sweeping: bool,
}

impl ArenaCollection {
    /// Create an empty collection; nothing is mapped until the first malloc
    pub fn new(arena_size: usize, page_size: usize, small_request_threshold: usize) -> Self {
        let classes = small_request_threshold / WORD + 1;
        Self {
            arena_size,
            page_size,
            small_request_threshold,
            arenas: IndexMap::new(),
            current_arena: None,
            size_classes: (0..classes).map(|_| SizeClass::default()).collect(),
            total_memory_used: 0,
            peak_memory_used: 0,
            sweeping: false,
        }
    }

    /// Allocate a block of exactly `size` bytes
    ///
    /// `size` must be word-aligned, at least [`MIN_OBJECT_SIZE`] and at most
    /// `small_request_threshold`. The block content is undefined.
    pub fn malloc(&mut self, size: usize) -> Result<usize> {
        debug_assert!(Alignment::is_aligned(size, WORD));
        debug_assert!(size >= MIN_OBJECT_SIZE && size <= self.small_request_threshold);

        let class = size / WORD;
        let mut page = match self.size_classes[class].partial.pop() {
            Some(page) => page,
            None => self.allocate_new_page(size)?,
        };
        let addr = page.alloc().ok_or_else(|| {
            GcError::InvariantViolation(format!("page {:#x} on the partial list is full", page.addr))
        })?;

        let class = &mut self.size_classes[class];
        if page.is_full() {
            class.full.push(page);
        } else {
            class.partial.push(page);
        }

        self.total_memory_used += size;
        self.peak_memory_used = self.peak_memory_used.max(self.total_memory_used);
        Ok(addr)
    }

    fn allocate_new_page(&mut self, block_size: usize) -> Result<Page> {
        let arena_key = match self.pick_arena() {
            Some(key) => key,
            None => self.allocate_new_arena()?,
        };
        let page_size = self.page_size;
        let addr = self
            .arenas
            .get_mut(&arena_key)
            .and_then(|arena| arena.take_page(page_size))
            .ok_or(GcError::OutOfMemory {
                requested: page_size,
                what: "arena page",
            })?;
        Ok(Page::new(addr, arena_key, page_size, block_size))
    }

    /// Prefer the current arena, then the fullest arena with a free page
    fn pick_arena(&mut self) -> Option<usize> {
        if let Some(key) = self.current_arena {
            if self.arenas.get(&key).is_some_and(|a| a.nfree_pages() > 0) {
                return Some(key);
            }
        }
        let best = self
            .arenas
            .iter()
            .filter(|(_, arena)| arena.nfree_pages() > 0)
            .min_by_key(|(_, arena)| arena.nfree_pages())
            .map(|(key, _)| *key);
        self.current_arena = best;
        best
    }

    fn allocate_new_arena(&mut self) -> Result<usize> {
        let size = self.arena_size;
        let mut map = MmapMut::map_anon(size).map_err(|source| GcError::MapFailed { size, source })?;
        let base = map.as_mut_ptr() as usize;
        log::trace!("mapped arena {:#x} ({} bytes)", base, size);

        self.arenas.insert(
            base,
            Arena {
                _map: map,
                base,
                npages: size / self.page_size,
                free_pages: Vec::new(),
                next_uninit_page: 0,
            },
        );
        self.current_arena = Some(base);
        Ok(base)
    }

    fn free_page(&mut self, page: Page) {
        if let Some(arena) = self.arenas.get_mut(&page.arena) {
            arena.free_pages.push(page.addr);
        }
    }

    fn free_empty_arenas(&mut self) {
        let empty: Vec<usize> = self
            .arenas
            .values()
            .filter(|arena| arena.is_completely_free())
            .map(|arena| arena.base)
            .collect();
        for key in empty {
            self.arenas.swap_remove(&key);
            if self.current_arena == Some(key) {
                self.current_arena = None;
            }
            log::trace!("released arena {:#x}", key);
        }
    }

    // ========================================================================
    // Sweeping
    // ========================================================================

    /// Snapshot every page in use for the coming sweep
    pub fn mass_free_prepare(&mut self) {
        for class in &mut self.size_classes {
            let mut partial = std::mem::take(&mut class.partial);
            let mut full = std::mem::take(&mut class.full);
            class.to_sweep.append(&mut partial);
            class.to_sweep.append(&mut full);
        }
        self.sweeping = true;
    }

    /// Sweep at most `max_pages` snapshot pages
    ///
    /// `ok_to_keep` decides for each allocated block whether it survives.
    /// Returns the number of pages swept and whether the snapshot is done.
    /// Completely free arenas are released when the snapshot is done.
    pub fn mass_free_incremental(
        &mut self,
        max_pages: usize,
        mut ok_to_keep: impl FnMut(usize) -> bool,
    ) -> (usize, bool) {
        let mut swept = 0;
        for class in 0..self.size_classes.len() {
            while swept < max_pages {
                let Some(mut page) = self.size_classes[class].to_sweep.pop() else {
                    break;
                };
                self.total_memory_used -= Self::sweep_page(&mut page, &mut ok_to_keep);
                swept += 1;

                if page.is_empty() {
                    self.free_page(page);
                } else if page.is_full() {
                    self.size_classes[class].full.push(page);
                } else {
                    self.size_classes[class].partial.push(page);
                }
            }
        }

        let done = self.size_classes.iter().all(|class| class.to_sweep.is_empty());
        if done && self.sweeping {
            self.sweeping = false;
            self.free_empty_arenas();
        }
        (swept, done)
    }

    fn sweep_page(page: &mut Page, ok_to_keep: &mut impl FnMut(usize) -> bool) -> usize {
        let mut freed = 0;
        for index in 0..page.next_uninit {
            if page.is_allocated(index) && !ok_to_keep(page.block_addr(index)) {
                page.free_block(index);
                freed += page.block_size;
            }
        }
        freed
    }

    /// Check if a sweep snapshot is pending
    pub fn is_sweeping(&self) -> bool {
        self.sweeping
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Bytes in allocated blocks
    pub fn total_memory_used(&self) -> usize {
        self.total_memory_used
    }

    /// Highest `total_memory_used` seen so far
    pub fn peak_memory_used(&self) -> usize {
        self.peak_memory_used
    }

    /// Number of mapped arenas
    pub fn arenas_count(&self) -> usize {
        self.arenas.len()
    }

    /// Bytes mapped for arenas
    pub fn total_arena_bytes(&self) -> usize {
        self.arenas.len() * self.arena_size
    }

    /// Check if `addr` lies in a mapped arena
    pub fn contains(&self, addr: usize) -> bool {
        self.arenas
            .keys()
            .any(|&base| addr >= base && addr < base + self.arena_size)
    }
}

impl std::fmt::Debug for ArenaCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaCollection")
            .field("arenas", &self.arenas.len())
            .field("total_memory_used", &self.total_memory_used)
            .field("sweeping", &self.sweeping)
            .finish()
    }
}
