//! GC Core Module - the collector and its major-cycle state machine
//!
//! [`Collector`] owns every piece of the heap: the nursery, the arenas, the
//! large objects, and the bookkeeping lists the barriers feed. It is driven
//! entirely by the mutator: allocation runs minor collections when the
//! nursery is full, and each minor collection may be followed by one step of
//! the incremental major cycle.
//!
//! ```text
//!   ┌──────────┐  roots seeded  ┌─────────┐  mark stack empty  ┌──────────┐
//!   │ SCANNING │ ─────────────► │ MARKING │ ─────────────────► │ SWEEPING │
//!   └──────────┘                └─────────┘                    └──────────┘
//!        ▲                                                          │
//!        │                     ┌────────────┐   snapshot swept      │
//!        └──────────────────── │ FINALIZING │ ◄─────────────────────┘
//!          threshold set       └────────────┘
//! ```
//!
//! A major step never runs without a minor collection right before it, so
//! the marker and the sweeper only ever see old objects.

use crate::allocator::arena::ArenaCollection;
use crate::allocator::large::LargeObjectSpace;
use crate::allocator::nursery::{ContextId, Nursery, NurseryCells};
use crate::config::GcConfig;
use crate::error::{fatal, GcError, Result};
use crate::hooks::{CollectStepEvent, GcHooks, MajorCollectEvent, NoHooks};
use crate::logging::{GcEvent, GcLogger, GcLoggerConfig};
use crate::marker::roots::RootWalker;
use crate::marker::MarkQueue;
use crate::object::header::{
    header, init_header, ObjectHeader, TypeId, GCFLAG_HAS_CARDS, GCFLAG_HAS_SHADOW,
    GCFLAG_NO_HEAP_PTRS, GCFLAG_OLD, GCFLAG_TRACK_YOUNG_PTRS, GCFLAG_VISITED,
};
use crate::object::layout::{TypeInfo, TypeLayoutProvider};
use crate::relocate::ShadowTable;
use crate::runtime::FinalizerQueue;
use crate::stats::{GcCounters, GcTimer};
use crate::barrier::cards;
use serde::Serialize;
use std::sync::Arc;

/// State of the incremental major cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GcState {
    /// Idle; the next step seeds the mark stack from the roots
    Scanning,
    /// Marking reachable old objects, a budget at a time
    Marking,
    /// Freeing unmarked objects, a budget at a time
    Sweeping,
    /// Computing the next threshold and reporting the cycle
    Finalizing,
}

impl std::fmt::Display for GcState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GcState::Scanning => "SCANNING",
            GcState::Marking => "MARKING",
            GcState::Sweeping => "SWEEPING",
            GcState::Finalizing => "FINALIZING",
        };
        f.write_str(name)
    }
}

/// Heap sizes recorded when a cycle starts
#[derive(Debug, Default, Clone, Copy)]
struct CycleStart {
    arenas_count_before: usize,
    rawmalloc_bytes_before: usize,
}

/// Type of a live object, aborting on unknown type ids
///
/// # Safety
/// `obj` must be a live object.
#[inline]
pub(crate) unsafe fn info_or_abort(types: &dyn TypeLayoutProvider, obj: usize) -> &TypeInfo {
    let type_id = header(obj).type_id();
    match types.type_info(type_id) {
        Some(info) => info,
        None => fatal(GcError::UnknownType { type_id }),
    }
}

/// Incremental generational moving collector
///
/// ## Thread Safety
///
/// A collector is `Send` but not shared: every operation takes `&mut self`.
/// Several mutator threads share one through
/// [`SharedCollector`](crate::mutator::SharedCollector), each with its own
/// execution context.
pub struct Collector {
    pub(crate) config: GcConfig,
    pub(crate) types: Arc<dyn TypeLayoutProvider>,

    pub(crate) nursery: Nursery,
    pub(crate) arenas: ArenaCollection,
    pub(crate) large: LargeObjectSpace,

    // filled by the barriers
    pub(crate) old_objects_pointing_to_young: Vec<usize>,
    pub(crate) old_objects_with_cards_set: Vec<usize>,
    pub(crate) prebuilt_root_objects: Vec<usize>,
    // references held by the collector itself across an allocation
    pub(crate) scratch_roots: Vec<usize>,

    pub(crate) shadows: ShadowTable,
    pub(crate) young_objects_with_weakrefs: Vec<usize>,
    pub(crate) old_objects_with_weakrefs: Vec<usize>,
    pub(crate) finalizers: FinalizerQueue,

    pub(crate) state: GcState,
    pub(crate) marker: MarkQueue,
    pub(crate) enabled: bool,
    pub(crate) next_major_collection_threshold: usize,
    pub(crate) memory_pressure: usize,
    cycle: CycleStart,
    pub(crate) counters: GcCounters,
    pub(crate) last_step_work: usize,

    pub(crate) root_walker: Option<Box<dyn RootWalker>>,
    pub(crate) hooks: Box<dyn GcHooks>,
    pub(crate) logger: GcLogger,
    pub(crate) verify_scratch: Vec<usize>,
}

impl Collector {
    /// Create a collector
    ///
    /// Maps the nursery right away; arenas are mapped on demand.
    ///
    /// # Errors
    /// [`GcError::Configuration`] if `config` is inconsistent,
    /// [`GcError::MapFailed`] if the nursery cannot be mapped.
    pub fn new(config: GcConfig, types: Arc<dyn TypeLayoutProvider>) -> Result<Self> {
        config.validate()?;

        let nursery = Nursery::new(config.nursery_size, config.block_size())?;
        let arenas = ArenaCollection::new(
            config.arena_size,
            config.page_size,
            config.small_request_threshold,
        );
        let logger = GcLogger::new(GcLoggerConfig {
            console: config.verbose,
            record: config.record_events,
            ..Default::default()
        });

        log::debug!(
            "collector created: nursery {} bytes (blocks of {}), arenas {} bytes, pages {} bytes",
            config.nursery_size,
            config.block_size(),
            config.arena_size,
            config.page_size
        );

        Ok(Self {
            next_major_collection_threshold: config.min_heap_size,
            config,
            types,
            nursery,
            arenas,
            large: LargeObjectSpace::new(),
            old_objects_pointing_to_young: Vec::new(),
            old_objects_with_cards_set: Vec::new(),
            prebuilt_root_objects: Vec::new(),
            scratch_roots: Vec::new(),
            shadows: ShadowTable::new(),
            young_objects_with_weakrefs: Vec::new(),
            old_objects_with_weakrefs: Vec::new(),
            finalizers: FinalizerQueue::new(),
            state: GcState::Scanning,
            marker: MarkQueue::new(),
            enabled: true,
            memory_pressure: 0,
            cycle: CycleStart::default(),
            counters: GcCounters::default(),
            last_step_work: 0,
            root_walker: None,
            hooks: Box::new(NoHooks),
            logger,
            verify_scratch: Vec::new(),
        })
    }

    /// Create a collector with [`GcConfig::default`]
    pub fn with_defaults(types: Arc<dyn TypeLayoutProvider>) -> Result<Self> {
        Self::new(GcConfig::default(), types)
    }

    /// Install the root walker, returning the previous one
    pub fn set_root_walker(&mut self, walker: Box<dyn RootWalker>) -> Option<Box<dyn RootWalker>> {
        self.root_walker.replace(walker)
    }

    /// Install the event hooks, returning the previous ones
    pub fn set_hooks(&mut self, hooks: Box<dyn GcHooks>) -> Box<dyn GcHooks> {
        std::mem::replace(&mut self.hooks, hooks)
    }

    /// Installed event hooks
    pub fn hooks_mut(&mut self) -> &mut dyn GcHooks {
        self.hooks.as_mut()
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn state(&self) -> GcState {
        self.state
    }

    pub fn logger(&self) -> &GcLogger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut GcLogger {
        &mut self.logger
    }

    /// Type-layout provider of this collector
    pub fn types(&self) -> &Arc<dyn TypeLayoutProvider> {
        &self.types
    }

    /// Check if `obj` is a young object
    #[inline]
    pub fn is_young(&self, obj: usize) -> bool {
        self.nursery.contains(obj)
    }

    /// Old generation bytes: arena blocks plus raw allocations
    pub(crate) fn old_generation_bytes(&self) -> usize {
        self.arenas.total_memory_used() + self.large.total_size()
    }

    pub(crate) fn type_info_or_abort(&self, type_id: TypeId) -> &TypeInfo {
        match self.types.type_info(type_id) {
            Some(info) => info,
            None => fatal(GcError::UnknownType { type_id }),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Allow collection steps to run on allocation (the default)
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop scheduling major steps on allocation
    ///
    /// Minor collections still run when the nursery fills up, and explicit
    /// [`Collector::collect`] / [`Collector::collect_step`] calls still work.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Report `bytes` of memory held outside the heap by GC objects
    ///
    /// Counts toward the next major collection threshold until the current
    /// cycle ends.
    pub fn add_memory_pressure(&mut self, bytes: usize) {
        self.memory_pressure = self.memory_pressure.saturating_add(bytes);
    }

    /// Check if the old generation (plus `extra` bytes) is above the threshold
    pub(crate) fn threshold_reached(&self, extra: usize) -> bool {
        self.old_generation_bytes() + self.memory_pressure + extra > self.next_major_collection_threshold
    }

    /// Minor collection followed by a major step when one is due
    pub(crate) fn minor_collection_with_major_progress(&mut self, extra: usize) {
        self.minor_collection();
        if self.enabled && (self.state != GcState::Scanning || self.threshold_reached(extra)) {
            self.major_collection_step();
        }
    }

    /// Explicit collection
    ///
    /// - `level == 0`: one minor collection
    /// - `level < 0`: one minor collection, plus a major step if one is due
    /// - `level >= 1`: finish the current major cycle, then run a complete
    ///   one, so everything unreachable now is freed on return
    pub fn collect(&mut self, level: i32) {
        match level {
            0 => self.minor_collection(),
            l if l < 0 => self.minor_collection_with_major_progress(0),
            _ => {
                log::debug!("full collection requested in state {}", self.state);
                self.gc_step_until(GcState::Scanning);
                self.gc_step_until(GcState::Marking);
                self.gc_step_until(GcState::Scanning);
            }
        }
    }

    fn gc_step_until(&mut self, state: GcState) {
        while self.state != state {
            self.minor_collection();
            self.major_collection_step();
        }
    }

    /// One minor collection plus exactly one major step
    ///
    /// Returns the major state before and after the step.
    pub fn collect_step(&mut self) -> (GcState, GcState) {
        self.minor_collection();
        self.major_collection_step()
    }

    /// Advance the major cycle by one bounded step
    ///
    /// Callers must have run a minor collection just before.
    pub(crate) fn major_collection_step(&mut self) -> (GcState, GcState) {
        debug_assert!(self.old_objects_pointing_to_young.is_empty());
        let timer = GcTimer::start();
        let old_state = self.state;
        let types = Arc::clone(&self.types);

        let work = match self.state {
            GcState::Scanning => {
                self.cycle = CycleStart {
                    arenas_count_before: self.arenas.arenas_count(),
                    rawmalloc_bytes_before: self.large.total_size(),
                };
                self.marker.reset_counters();
                self.collect_roots();
                self.state = GcState::Marking;
                0
            }
            GcState::Marking => {
                let visited = self.visit_objects_step(&*types, self.config.mark_step_budget);
                if self.marker.is_empty() {
                    self.deal_with_objects_with_finalizers(&*types);
                    let cleared = self.invalidate_old_weakrefs(&*types);
                    if cleared > 0 {
                        self.logger.record(GcEvent::WeakRefs { cleared });
                    }
                    self.arenas.mass_free_prepare();
                    self.large.prepare_sweep();
                    self.state = GcState::Sweeping;
                }
                visited
            }
            GcState::Sweeping => {
                let (swept, done) = self.sweep_step(&*types);
                if done {
                    self.state = GcState::Finalizing;
                }
                swept
            }
            GcState::Finalizing => {
                self.finish_major_cycle();
                self.state = GcState::Scanning;
                0
            }
        };

        self.last_step_work = work;
        self.counters.major_steps += 1;
        self.maybe_verify("major collection step");

        let duration = timer.elapsed();
        self.counters.step_pauses.record(duration.as_micros() as u64);
        self.logger.record(GcEvent::CollectStep {
            old_state,
            new_state: self.state,
            work,
            duration_us: duration.as_micros() as u64,
        });
        if self.hooks.is_gc_collect_step_enabled() {
            self.hooks.on_gc_collect_step(&CollectStepEvent {
                duration,
                old_state,
                new_state: self.state,
            });
        }
        (old_state, self.state)
    }

    /// Sweep up to `sweep_step_pages` large objects and arena pages
    fn sweep_step(&mut self, types: &dyn TypeLayoutProvider) -> (usize, bool) {
        let budget = self.config.sweep_step_pages;
        let cpi = self.config.card_page_indices;

        let (examined, large_done) = self.large.sweep_step(budget, |obj| {
            // SAFETY: the sweep queue only holds registered large objects
            unsafe {
                let hdr = header(obj);
                if !hdr.has(GCFLAG_VISITED) {
                    return false;
                }
                hdr.clear(GCFLAG_VISITED);
                if hdr.has(GCFLAG_HAS_CARDS) {
                    let length = info_or_abort(types, obj).length(obj);
                    cards::clear_cards(obj, cards::card_bytes_for_length(length, cpi));
                }
                true
            }
        });
        if !large_done {
            return (examined, false);
        }

        let (pages, done) = self.arenas.mass_free_incremental(budget - examined, |obj| {
            // SAFETY: allocated arena blocks always start with a header
            unsafe {
                let hdr = header(obj);
                if hdr.has(GCFLAG_VISITED) {
                    hdr.clear(GCFLAG_VISITED);
                    true
                } else {
                    false
                }
            }
        });
        (examined + pages, done)
    }

    fn finish_major_cycle(&mut self) {
        for &obj in &self.prebuilt_root_objects {
            // SAFETY: prebuilt objects live as long as the collector
            unsafe { header(obj).clear(GCFLAG_VISITED) };
        }

        let live = self.old_generation_bytes();
        let mut threshold = (live as f64 * self.config.major_collection_threshold) as usize;
        threshold = threshold.max(self.config.min_heap_size);
        if self.config.max_heap_size > 0 {
            if live > self.config.max_heap_size {
                fatal(GcError::HeapLimitExceeded {
                    live,
                    limit: self.config.max_heap_size,
                });
            }
            threshold = threshold.min(self.config.max_heap_size);
        }
        self.next_major_collection_threshold = threshold;
        self.memory_pressure = 0;
        self.counters.major_collections += 1;

        let event = MajorCollectEvent {
            count: self.counters.major_collections,
            arenas_count_before: self.cycle.arenas_count_before,
            arenas_count_after: self.arenas.arenas_count(),
            arenas_bytes: self.arenas.total_memory_used(),
            rawmalloc_bytes_before: self.cycle.rawmalloc_bytes_before,
            rawmalloc_bytes_after: self.large.total_size(),
        };
        self.cycle = CycleStart::default();

        self.logger.record(GcEvent::MajorCollection {
            count: event.count,
            live_bytes: live,
            next_threshold: threshold,
            arenas_count_before: event.arenas_count_before,
            arenas_count_after: event.arenas_count_after,
        });
        if self.hooks.is_gc_collect_enabled() {
            self.hooks.on_gc_collect(&event);
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Stable identity of `obj`
    ///
    /// Old objects are their own identity. A young object gets an old block
    /// reserved as its future copy, so the identity survives the move.
    ///
    /// # Safety
    /// `obj` must be 0 or a live object of this collector.
    pub unsafe fn id(&mut self, obj: usize) -> usize {
        if obj == 0 || !self.nursery.contains(obj) {
            return obj;
        }
        let hdr = header(obj);
        if hdr.has(GCFLAG_HAS_SHADOW) {
            if let Some(shadow) = self.shadows.get(obj) {
                return shadow;
            }
        }

        let types = Arc::clone(&self.types);
        let info = info_or_abort(&*types, obj);
        let size = info.object_size(obj);
        let card_area = self.card_area_for(info, obj, size);
        let shadow = self.allocate_old_block(size, card_area);
        // an unused shadow must look like unmarked garbage to the sweeper
        init_header(shadow, ObjectHeader::new(0));

        self.shadows.insert(obj, shadow);
        hdr.set(GCFLAG_HAS_SHADOW);
        shadow
    }

    /// Identity hash of `obj`, stable across moves
    ///
    /// # Safety
    /// Same as [`Collector::id`].
    pub unsafe fn identityhash(&mut self, obj: usize) -> u64 {
        let id = self.id(obj) as u64;
        id ^ (id >> 4)
    }

    // ========================================================================
    // Prebuilt objects
    // ========================================================================

    /// Turn caller-owned memory into a prebuilt object of type `type_id`
    ///
    /// Prebuilt objects are never moved or freed and are not traced until
    /// the write barrier sees a store into them.
    ///
    /// # Safety
    /// `addr` must be word-aligned, big enough for the type, initialized with
    /// zero or valid references, and outlive the collector.
    pub unsafe fn init_prebuilt(&mut self, addr: usize, type_id: TypeId) {
        let _ = self.type_info_or_abort(type_id);
        init_header(
            addr,
            ObjectHeader::with_flags(
                type_id,
                GCFLAG_OLD | GCFLAG_TRACK_YOUNG_PTRS | GCFLAG_NO_HEAP_PTRS,
            ),
        );
    }

    // ========================================================================
    // Execution contexts
    // ========================================================================

    /// Register an execution context
    pub fn register_thread_context(&mut self, id: ContextId) {
        self.nursery.register_context(id);
    }

    /// Make `id` the context allocations go to; returns the previous one
    pub fn switch_thread_context(&mut self, id: ContextId) -> ContextId {
        self.nursery.switch_context(id)
    }

    /// Forget an execution context
    ///
    /// # Errors
    /// [`GcError::UnknownContext`] for unknown ids and the active context.
    pub fn remove_thread_context(&mut self, id: ContextId) -> Result<()> {
        self.nursery.remove_context(id)
    }

    /// The active execution context
    pub fn current_thread_context(&self) -> ContextId {
        self.nursery.current_context()
    }

    /// Nursery cells of a context
    pub fn nursery_cells(&self, id: ContextId) -> Option<NurseryCells> {
        self.nursery.cells(id)
    }

    /// Clear the nursery cells of every context
    ///
    /// Every context takes a fresh sub-block on its next allocation.
    pub fn zero_nursery_pointers_in_all_threads(&mut self) {
        self.nursery.zero_nursery_pointers_in_all_threads();
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("nursery", &self.nursery)
            .field("arenas", &self.arenas)
            .field("large_objects", &self.large.len())
            .field("next_major_collection_threshold", &self.next_major_collection_threshold)
            .finish()
    }
}
