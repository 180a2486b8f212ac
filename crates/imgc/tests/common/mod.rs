//! Test Utilities for the imgc Test Suite
//!
//! Every test builds a [`GcFixture`]: a collector over a small, fixed set of
//! types, rooted through a [`ShadowStack`], with hooks that record every
//! event they receive.
//!
//! ============================================================================
//! Addresses of young objects change on every allocation. Tests keep what
//! they need in root slots and reload it after anything that may collect.
//! ============================================================================

#![allow(dead_code)]

use imgc::hooks::{CollectStepEvent, MajorCollectEvent, MinorCollectEvent};
use imgc::mutator;
use imgc::object::header::{header, GCFLAG_VISITED};
use imgc::{
    CallbackHooks, Collector, GcConfig, GcState, ShadowStack, StatsKind, TypeId, TypeInfo,
    TypeTable,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Node payload: `left` reference, `right` reference, integer `value`
pub const NODE_LEFT: usize = 0;
pub const NODE_RIGHT: usize = 8;
pub const NODE_VALUE: usize = 16;
pub const NODE_PAYLOAD: usize = 24;

/// Leaf payload: two integers, no references (24 bytes with the header)
pub const LEAF_PAYLOAD: usize = 16;

/// Resource payload: one reference, one integer
pub const RESOURCE_PAYLOAD: usize = 16;

/// Type ids of the fixture's type table
#[derive(Debug, Clone, Copy)]
pub struct TestTypes {
    pub node: TypeId,
    pub leaf: TypeId,
    pub ref_array: TypeId,
    pub word_array: TypeId,
    pub weakref: TypeId,
    pub resource: TypeId,
}

impl TestTypes {
    pub fn table() -> (TypeTable, TestTypes) {
        let mut table = TypeTable::new();
        let types = TestTypes {
            node: table.register(TypeInfo::struct_type(
                "Node",
                NODE_PAYLOAD,
                vec![NODE_LEFT, NODE_RIGHT],
            )),
            leaf: table.register(TypeInfo::struct_type("Leaf", LEAF_PAYLOAD, vec![])),
            ref_array: table.register(TypeInfo::array_type("RefArray", 8, vec![0])),
            word_array: table.register(TypeInfo::array_type("WordArray", 8, vec![])),
            weakref: table.register(TypeInfo::weakref_type("WeakRef")),
            resource: table.register(
                TypeInfo::struct_type("Resource", RESOURCE_PAYLOAD, vec![0]).with_finalizer(),
            ),
        };
        (table, types)
    }
}

/// One event delivered to the fixture's hooks
#[derive(Debug, Clone, Copy)]
pub enum HookEvent {
    Minor(MinorCollectEvent),
    Step(CollectStepEvent),
    Collect(MajorCollectEvent),
}

/// ============================================================================
/// GC FIXTURE
/// ============================================================================

/// Collector plus roots, types and recorded hook events
pub struct GcFixture {
    pub gc: Collector,
    pub roots: ShadowStack,
    pub types: TestTypes,
    pub events: Arc<Mutex<Vec<HookEvent>>>,
}

impl GcFixture {
    /// Small heap: 64KB nursery in 16KB sub-blocks, heap verification on
    ///
    /// **Bug this finds:** anything that breaks the heap invariants aborts
    /// at the first minor collection or major step after it happens.
    pub fn new() -> Self {
        Self::with_config(Self::small_config())
    }

    /// Same as [`GcFixture::new`] with the heap verifier off
    pub fn unverified() -> Self {
        Self::with_config(GcConfig {
            verify_heap: false,
            ..Self::small_config()
        })
    }

    pub fn small_config() -> GcConfig {
        GcConfig {
            nursery_size: 64 * KB,
            nursery_block_size: Some(16 * KB),
            arena_size: 64 * KB,
            page_size: 8 * KB,
            large_object_threshold: 8 * KB,
            min_heap_size: 256 * KB,
            verify_heap: true,
            record_events: true,
            ..Default::default()
        }
    }

    /// Build a fixture around `config`
    ///
    /// **Bug this finds:** configuration validation rejecting sane values.
    pub fn with_config(config: GcConfig) -> Self {
        let (table, types) = TestTypes::table();
        let mut gc = Collector::new(config, Arc::new(table))
            .expect("collector creation should succeed with a valid config");

        let roots = ShadowStack::new();
        gc.set_root_walker(Box::new(roots.clone()));

        let events = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = CallbackHooks::new();
        let sink = Arc::clone(&events);
        hooks.set_on_gc_minor(move |e| sink.lock().push(HookEvent::Minor(*e)));
        let sink = Arc::clone(&events);
        hooks.set_on_gc_collect_step(move |e| sink.lock().push(HookEvent::Step(*e)));
        let sink = Arc::clone(&events);
        hooks.set_on_gc_collect(move |e| sink.lock().push(HookEvent::Collect(*e)));
        gc.set_hooks(Box::new(hooks));

        Self {
            gc,
            roots,
            types,
            events,
        }
    }

    // ========================================================================
    // Object helpers
    // ========================================================================

    /// Allocate a node carrying `value`; the address is valid until the
    /// next allocation
    pub fn node(&mut self, value: usize) -> usize {
        let obj = self.gc.allocate(self.types.node, NODE_PAYLOAD);
        unsafe { mutator::store_word(obj, NODE_VALUE, value) };
        obj
    }

    /// Allocate a node carrying `value` and keep it in a new root slot
    pub fn rooted_node(&mut self, value: usize) -> usize {
        let obj = self.node(value);
        self.roots.push(obj)
    }

    /// Current address held by root slot `slot`
    pub fn root(&self, slot: usize) -> usize {
        self.roots.get(slot)
    }

    pub fn value(&self, obj: usize) -> usize {
        unsafe { mutator::load_ref(obj, NODE_VALUE) }
    }

    pub fn left(&self, obj: usize) -> usize {
        unsafe { mutator::load_ref(obj, NODE_LEFT) }
    }

    pub fn right(&self, obj: usize) -> usize {
        unsafe { mutator::load_ref(obj, NODE_RIGHT) }
    }

    pub fn set_left(&mut self, obj: usize, child: usize) {
        unsafe { mutator::store_ref(&mut self.gc, obj, NODE_LEFT, child) };
    }

    pub fn set_right(&mut self, obj: usize, child: usize) {
        unsafe { mutator::store_ref(&mut self.gc, obj, NODE_RIGHT, child) };
    }

    /// Allocate a weakref to the object in root slot `target_slot` and root it
    pub fn rooted_weakref(&mut self, target_slot: usize) -> usize {
        let target = self.root(target_slot);
        let weak = unsafe { self.gc.allocate_weakref(self.types.weakref, target) };
        self.roots.push(weak)
    }

    pub fn weak_target(&self, weak_slot: usize) -> usize {
        unsafe { self.gc.weakref_target(self.root(weak_slot)) }
    }

    /// Allocate a reference array of `length` items and root it
    pub fn rooted_ref_array(&mut self, length: usize) -> usize {
        let array = self.gc.allocate_varsize(self.types.ref_array, length);
        self.roots.push(array)
    }

    /// Walk `left` links from `obj`, collecting values
    pub fn left_chain_values(&self, mut obj: usize) -> Vec<usize> {
        let mut values = Vec::new();
        while obj != 0 {
            values.push(self.value(obj));
            obj = self.left(obj);
        }
        values
    }

    // ========================================================================
    // Collection helpers
    // ========================================================================

    /// Run steps until the major cycle reaches `state`
    pub fn step_until(&mut self, state: GcState) -> usize {
        let mut steps = 0;
        while self.gc.state() != state {
            self.gc.collect_step();
            steps += 1;
            assert!(steps < 100_000, "major cycle never reached {}", state);
        }
        steps
    }

    pub fn used_arena_bytes(&self) -> usize {
        self.gc.stats_query(StatsKind::UsedArenaBytes)
    }

    pub fn is_marked(&self, obj: usize) -> bool {
        unsafe { header(obj).has(GCFLAG_VISITED) }
    }

    // ========================================================================
    // Hook events
    // ========================================================================

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn take_events(&self) -> Vec<HookEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn minor_events(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, HookEvent::Minor(_)))
            .count()
    }

    pub fn step_events(&self) -> Vec<CollectStepEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HookEvent::Step(step) => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub fn collect_events(&self) -> Vec<MajorCollectEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                HookEvent::Collect(collect) => Some(*collect),
                _ => None,
            })
            .collect()
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Assert that an object lives in the old generation
///
/// **Bug this finds:** survivors left in the nursery, roots not updated
/// after a move.
#[track_caller]
pub fn assert_old(fx: &GcFixture, obj: usize, context: &str) {
    assert_ne!(obj, 0, "{}: null reference", context);
    assert!(
        !fx.gc.is_young(obj),
        "{}: object 0x{:x} is still in the nursery",
        context,
        obj
    );
}

/// Assert that the heap verifier accepts the heap
///
/// **Bug this finds:** unrecorded old-to-young references, stale marks,
/// dangling forwarded references.
#[track_caller]
pub fn assert_heap_valid(fx: &mut GcFixture, context: &str) -> usize {
    match fx.gc.verify_heap() {
        Ok(checked) => checked,
        Err(err) => panic!("{}: heap verification failed: {}", context, err),
    }
}

/// Assert a chain of `left` links carries exactly `expected` values
///
/// **Bug this finds:** lost or duplicated objects, fields copied wrong
/// during promotion.
#[track_caller]
pub fn assert_chain(fx: &GcFixture, head: usize, expected: &[usize], context: &str) {
    let values = fx.left_chain_values(head);
    assert_eq!(values, expected, "{}: chain contents changed", context);
}

/// Assert that the old generation holds no small objects any more
///
/// **Bug this finds:** garbage surviving a complete major cycle.
#[track_caller]
pub fn assert_arenas_empty(fx: &GcFixture, context: &str) {
    assert_eq!(
        fx.used_arena_bytes(),
        0,
        "{}: arena blocks still allocated after a full collection",
        context
    );
}
