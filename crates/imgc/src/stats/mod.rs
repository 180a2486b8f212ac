//! Stats Module - GC Performance Monitoring
//!
//! Counters are plain fields updated by the collector as it works; the
//! public view is a [`GcStatistics`] snapshot or a single number through
//! [`Collector::stats_query`].
//!
//! Metrics:
//! - memory in use (arenas, raw allocations, memory pressure)
//! - collection counts and the work of the last step
//! - pause time distributions for minor collections and major steps

pub mod histogram;
pub mod timer;

pub use histogram::{Histogram, HistogramSummary};
pub use timer::GcTimer;

use crate::gc::{Collector, GcState};
use serde::Serialize;

/// Running counters of one collector
#[derive(Debug, Default, Clone)]
pub struct GcCounters {
    pub minor_collections: usize,
    pub major_collections: usize,
    pub major_steps: usize,
    pub last_minor_promoted_objects: usize,
    pub last_minor_promoted_bytes: usize,
    pub last_minor_cards_scanned: usize,
    pub total_promoted_bytes: usize,
    pub weakrefs_cleared: usize,
    pub minor_pauses: Histogram,
    pub step_pauses: Histogram,
}

impl GcCounters {
    /// Start counting a new minor collection
    pub(crate) fn reset_minor(&mut self) {
        self.total_promoted_bytes += self.last_minor_promoted_bytes;
        self.last_minor_promoted_objects = 0;
        self.last_minor_promoted_bytes = 0;
        self.last_minor_cards_scanned = 0;
    }
}

/// Quantities answered by [`Collector::stats_query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatsKind {
    /// Bytes mapped for arenas
    TotalArenaBytes,
    /// Bytes in allocated arena blocks
    UsedArenaBytes,
    /// Bytes of raw allocations (large objects and their cards)
    RawMallocBytes,
    /// Externally reported bytes since the last major cycle
    MemoryPressure,
    /// Old generation bytes (arena blocks plus raw allocations)
    TotalMemoryUsed,
    /// `TotalMemoryUsed` plus `MemoryPressure`
    TotalMemoryUsedWithPressure,
    /// Highest `UsedArenaBytes` seen so far
    PeakArenaBytes,
    /// Bytes the next major cycle starts at
    NextMajorThreshold,
}

/// Snapshot of a collector's statistics
#[derive(Debug, Clone, Serialize)]
pub struct GcStatistics {
    pub state: GcState,
    pub enabled: bool,
    pub minor_collections: usize,
    pub major_collections: usize,
    pub major_steps: usize,
    pub nursery_size: usize,
    /// Nursery bytes not yet handed to any context
    pub nursery_free: usize,
    pub arenas_count: usize,
    pub total_arena_bytes: usize,
    pub used_arena_bytes: usize,
    pub peak_arena_bytes: usize,
    pub rawmalloc_bytes: usize,
    pub large_objects: usize,
    pub memory_pressure: usize,
    pub total_memory_used: usize,
    pub next_major_threshold: usize,
    pub total_promoted_bytes: usize,
    pub last_minor_promoted_bytes: usize,
    pub last_minor_cards_scanned: usize,
    pub last_step_work: usize,
    pub weakrefs_cleared: usize,
    pub pending_finalizers: usize,
    pub minor_pauses: HistogramSummary,
    pub step_pauses: HistogramSummary,
}

impl GcStatistics {
    /// Render as pretty JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Old generation bytes plus reported external memory
    pub fn total_memory_used_with_pressure(&self) -> usize {
        self.total_memory_used + self.memory_pressure
    }
}

impl Collector {
    /// Read one statistic
    pub fn stats_query(&self, kind: StatsKind) -> usize {
        match kind {
            StatsKind::TotalArenaBytes => self.arenas.total_arena_bytes(),
            StatsKind::UsedArenaBytes => self.arenas.total_memory_used(),
            StatsKind::RawMallocBytes => self.large.total_size(),
            StatsKind::MemoryPressure => self.memory_pressure,
            StatsKind::TotalMemoryUsed => self.old_generation_bytes(),
            StatsKind::TotalMemoryUsedWithPressure => self.old_generation_bytes() + self.memory_pressure,
            StatsKind::PeakArenaBytes => self.arenas.peak_memory_used(),
            StatsKind::NextMajorThreshold => self.next_major_collection_threshold,
        }
    }

    /// Snapshot every statistic
    pub fn statistics(&self) -> GcStatistics {
        GcStatistics {
            state: self.state,
            enabled: self.enabled,
            minor_collections: self.counters.minor_collections,
            major_collections: self.counters.major_collections,
            major_steps: self.counters.major_steps,
            nursery_size: self.nursery.size(),
            nursery_free: self.nursery.size() - self.nursery.reserved_bytes(),
            arenas_count: self.arenas.arenas_count(),
            total_arena_bytes: self.arenas.total_arena_bytes(),
            used_arena_bytes: self.arenas.total_memory_used(),
            peak_arena_bytes: self.arenas.peak_memory_used(),
            rawmalloc_bytes: self.large.total_size(),
            large_objects: self.large.len(),
            memory_pressure: self.memory_pressure,
            total_memory_used: self.old_generation_bytes(),
            next_major_threshold: self.next_major_collection_threshold,
            total_promoted_bytes: self.counters.total_promoted_bytes
                + self.counters.last_minor_promoted_bytes,
            last_minor_promoted_bytes: self.counters.last_minor_promoted_bytes,
            last_minor_cards_scanned: self.counters.last_minor_cards_scanned,
            last_step_work: self.last_step_work,
            weakrefs_cleared: self.counters.weakrefs_cleared,
            pending_finalizers: self.finalizers.pending_len(),
            minor_pauses: self.counters.minor_pauses.summary(),
            step_pauses: self.counters.step_pauses.summary(),
        }
    }

    /// Units of work done by the last major collection step
    ///
    /// Objects visited while marking, pages and large objects examined while
    /// sweeping, 0 for the other states.
    pub fn last_step_work(&self) -> usize {
        self.last_step_work
    }
}
