//! Stress tests
//!
//! Long allocation runs through a tiny nursery, and random graph mutation
//! checked against a model after every phase.

mod common;

use common::*;
use imgc::{GcConfig, StatsKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

// ============================================================================
// END TO END
// ============================================================================

/// Nursery holding exactly 1000 nodes
fn tiny_nursery_config() -> GcConfig {
    GcConfig {
        nursery_size: 1000 * (8 + NODE_PAYLOAD),
        nursery_block_size: None,
        large_object_threshold: 4 * KB,
        ..GcFixture::small_config()
    }
}

/// **Bug this finds:** anything that goes wrong only after hundreds of
/// minor collections interleaved with incremental major cycles.
#[test]
fn test_hundred_thousand_objects_through_tiny_nursery() {
    // Arrange
    let mut fx = GcFixture::with_config(tiny_nursery_config());
    let head_slot = fx.roots.push(0);

    // Act: every tenth node stays reachable
    for value in 0..100_000 {
        let node = fx.node(value);
        if value % 10 == 0 {
            let head = fx.root(head_slot);
            fx.set_left(node, head);
            fx.roots.set(head_slot, node);
        }
    }
    fx.gc.collect(1);

    // Assert
    let stats = fx.gc.statistics();
    assert!(stats.minor_collections >= 99, "only {} minors", stats.minor_collections);
    assert!(stats.major_collections >= 1);
    let expected: Vec<usize> = (0..100_000).step_by(10).rev().collect();
    assert_chain(&fx, fx.root(head_slot), &expected, "surviving tenth");
    assert!(fx.gc.stats_query(StatsKind::PeakArenaBytes) >= 10_000 * 32);

    fx.roots.clear();
    fx.gc.collect(1);
    assert_arenas_empty(&fx, "after dropping the chain");
    assert_eq!(fx.gc.stats_query(StatsKind::TotalMemoryUsed), 0);
}

/// **Bug this finds:** raw allocations leaking when they die young in the
/// old generation.
#[test]
fn test_large_object_churn_stays_bounded() {
    // Arrange
    let mut fx = GcFixture::new();
    let array_bytes = 8 + 8 + 2000 * 8;

    // Act
    for _ in 0..500 {
        fx.gc.allocate_varsize(fx.types.word_array, 2000);
    }

    // Assert
    let raw = fx.gc.stats_query(StatsKind::RawMallocBytes);
    assert!(
        raw < 200 * array_bytes,
        "{} bytes of dead large objects still allocated",
        raw
    );
    fx.gc.collect(1);
    assert_eq!(fx.gc.stats_query(StatsKind::RawMallocBytes), 0);
}

// ============================================================================
// RANDOM GRAPH
// ============================================================================

const SLOTS: usize = 64;

/// What the heap should look like: edges per node value, values per root
struct Model {
    edges: HashMap<usize, [usize; 2]>,
    roots: Vec<usize>,
    next_value: usize,
}

impl Model {
    fn new() -> Self {
        Self {
            edges: HashMap::new(),
            roots: vec![0; SLOTS],
            next_value: 1,
        }
    }
}

/// Compare everything reachable from the roots with the model
#[track_caller]
fn assert_graph_matches(fx: &GcFixture, model: &Model, slot_base: usize) {
    let mut seen = HashSet::new();
    let mut pending: Vec<usize> = (0..SLOTS).map(|i| fx.root(slot_base + i)).collect();
    for (i, &obj) in pending.iter().enumerate() {
        let value = if obj == 0 { 0 } else { fx.value(obj) };
        assert_eq!(value, model.roots[i], "root slot {}", i);
    }

    while let Some(obj) = pending.pop() {
        if obj == 0 || !seen.insert(obj) {
            continue;
        }
        let value = fx.value(obj);
        let expected = model.edges.get(&value).copied().unwrap_or_default();
        let (left, right) = (fx.left(obj), fx.right(obj));
        let child_value = |child: usize| if child == 0 { 0 } else { fx.value(child) };
        assert_eq!(
            [child_value(left), child_value(right)],
            expected,
            "edges of node {}",
            value
        );
        pending.push(left);
        pending.push(right);
    }
}

/// **Bug this finds:** any interleaving of stores, root drops, minor
/// collections and major steps that loses or corrupts an edge.
#[test]
fn test_random_graph_mutation() {
    // Arrange
    let mut fx = GcFixture::with_config(GcConfig {
        mark_step_budget: 16,
        sweep_step_pages: 1,
        ..GcFixture::small_config()
    });
    let mut rng = StdRng::seed_from_u64(0x1dc0_ffee);
    let mut model = Model::new();
    let slot_base = fx.roots.len();
    for _ in 0..SLOTS {
        fx.roots.push(0);
    }

    // Act
    for round in 0..5_000 {
        let slot = rng.gen_range(0..SLOTS);
        match rng.gen_range(0..100) {
            0..=29 => {
                let value = model.next_value;
                model.next_value += 1;
                let node = fx.node(value);
                fx.roots.set(slot_base + slot, node);
                model.roots[slot] = value;
                model.edges.insert(value, [0, 0]);
            }
            30..=69 => {
                let target = rng.gen_range(0..SLOTS);
                let field = rng.gen_range(0..2);
                let (from, to) = (fx.root(slot_base + slot), fx.root(slot_base + target));
                if from == 0 || to == 0 {
                    continue;
                }
                if field == 0 {
                    fx.set_left(from, to);
                } else {
                    fx.set_right(from, to);
                }
                if let Some(edges) = model.edges.get_mut(&model.roots[slot]) {
                    edges[field] = model.roots[target];
                }
            }
            70..=79 => {
                let from = fx.root(slot_base + slot);
                if from == 0 {
                    continue;
                }
                let field = rng.gen_range(0..2);
                if field == 0 {
                    fx.set_left(from, 0);
                } else {
                    fx.set_right(from, 0);
                }
                if let Some(edges) = model.edges.get_mut(&model.roots[slot]) {
                    edges[field] = 0;
                }
            }
            80..=87 => {
                fx.roots.set(slot_base + slot, 0);
                model.roots[slot] = 0;
            }
            88..=95 => {
                fx.gc.collect_step();
            }
            _ => fx.gc.collect(0),
        }

        if round % 500 == 499 {
            assert_graph_matches(&fx, &model, slot_base);
        }
    }

    // Assert
    fx.gc.collect(1);
    assert_graph_matches(&fx, &model, slot_base);
    assert_heap_valid(&mut fx, "after random mutation");
    assert!(fx.gc.statistics().major_collections >= 1);
}
