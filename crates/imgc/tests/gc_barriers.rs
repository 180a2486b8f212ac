//! Write barrier tests
//!
//! Old-to-young references created after promotion must be found by the
//! next minor collection: through the remembered set for plain objects,
//! through single cards for large arrays, and through the bulk barrier for
//! array copies.

mod common;

use common::*;
use imgc::mutator;
use imgc::object::header::{header, GCFLAG_CARDS_SET, GCFLAG_TRACK_YOUNG_PTRS};
use imgc::GcError;

// ============================================================================
// REMEMBERED SET
// ============================================================================

/// **Bug this finds:** young objects reachable only from an old object are
/// freed by the minor collection.
#[test]
fn test_old_to_young_store_survives_minor() {
    // Arrange
    let mut fx = GcFixture::new();
    let parent_slot = fx.rooted_node(1);
    fx.gc.collect(0);
    let parent = fx.root(parent_slot);
    assert_old(&fx, parent, "parent");

    // Act
    let child = fx.node(2);
    fx.set_left(parent, child);
    fx.gc.collect(0);

    // Assert
    let child = fx.left(parent);
    assert_old(&fx, child, "child reachable only through an old object");
    assert_eq!(fx.value(child), 2);
    assert_heap_valid(&mut fx, "after minor");
}

/// **Bug this finds:** the barrier staying on the slow path forever, or
/// never re-arming after a minor collection.
#[test]
fn test_barrier_records_each_object_once_per_minor() {
    // Arrange
    let mut fx = GcFixture::new();
    let slot = fx.rooted_node(1);
    fx.gc.collect(0);
    let parent = fx.root(slot);
    let track = |obj: usize| unsafe { header(obj).has(GCFLAG_TRACK_YOUNG_PTRS) };
    assert!(track(parent), "promoted objects start unrecorded");

    // Act / Assert
    let child = fx.node(2);
    fx.set_left(parent, child);
    assert!(!track(parent), "first store records the object");
    let child = fx.node(3);
    fx.set_right(parent, child);
    assert!(!track(parent));

    fx.gc.collect(0);
    assert!(track(parent), "minor collection re-arms the barrier");
    assert_eq!(fx.value(fx.left(parent)), 2);
    assert_eq!(fx.value(fx.right(parent)), 3);
}

/// **Bug this finds:** the verifier missing exactly the corruption the
/// barrier exists to prevent.
#[test]
fn test_unbarriered_store_is_detected() {
    // Arrange
    let mut fx = GcFixture::unverified();
    let slot = fx.rooted_node(1);
    fx.gc.collect(0);
    let parent = fx.root(slot);

    // Act
    let child = fx.node(2);
    unsafe { mutator::store_ref_unbarriered(parent, NODE_LEFT, child) };
    fx.gc.collect(0);

    // Assert
    let result = fx.gc.verify_heap();
    assert!(
        matches!(result, Err(GcError::InvariantViolation(_))),
        "a reference into the emptied nursery must be reported, got {:?}",
        result
    );
}

/// **Bug this finds:** deep young structures hanging off an old object
/// promoted only one level deep.
#[test]
fn test_young_subgraph_under_old_object_is_promoted() {
    // Arrange
    let mut fx = GcFixture::new();
    let parent_slot = fx.rooted_node(0);
    fx.gc.collect(0);

    let tail_slot = fx.roots.push(0);
    for value in 1..=50 {
        let node = fx.node(value);
        let tail = fx.root(tail_slot);
        fx.set_left(node, tail);
        fx.roots.set(tail_slot, node);
    }
    let parent = fx.root(parent_slot);
    let chain = fx.root(tail_slot);
    fx.set_left(parent, chain);
    fx.roots.set(tail_slot, 0);

    // Act
    fx.gc.collect(0);

    // Assert
    let mut expected: Vec<usize> = (1..=50).rev().collect();
    expected.insert(0, 0);
    assert_chain(&fx, fx.root(parent_slot), &expected, "old parent with young chain");
}

// ============================================================================
// CARD MARKING
// ============================================================================

/// **Bug this finds:** card rescans walking the whole array instead of the
/// one card the mutator touched.
#[test]
fn test_only_the_set_card_is_scanned() {
    // Arrange
    let mut fx = GcFixture::new();
    let array_slot = fx.rooted_ref_array(2000);
    let array = fx.root(array_slot);
    assert_old(&fx, array, "large array");
    fx.gc.collect(0);
    assert_eq!(fx.gc.statistics().last_minor_cards_scanned, 0);

    // Act
    let node = fx.node(1500);
    let array = fx.root(array_slot);
    unsafe { mutator::store_array_item(&mut fx.gc, array, 1500, node) };
    assert!(unsafe { header(array).has(GCFLAG_CARDS_SET) });
    fx.gc.collect(0);

    // Assert
    assert_eq!(fx.gc.statistics().last_minor_cards_scanned, 1);
    let item = unsafe { mutator::load_array_item(&fx.gc, array, 1500) };
    assert_old(&fx, item, "item behind the card");
    assert_eq!(fx.value(item), 1500);
    assert!(!unsafe { header(array).has(GCFLAG_CARDS_SET) });
}

/// **Bug this finds:** cards on the same byte or on distant bytes merged or
/// dropped.
#[test]
fn test_several_cards_in_one_minor() {
    // Arrange
    let mut fx = GcFixture::new();
    let array_slot = fx.rooted_ref_array(2000);
    let indices = [0usize, 5, 130, 1999];

    // Act
    for &index in &indices {
        let node = fx.node(index);
        let array = fx.root(array_slot);
        unsafe { mutator::store_array_item(&mut fx.gc, array, index, node) };
    }
    fx.gc.collect(0);

    // Assert
    // items 0 and 5 share the first card
    assert_eq!(fx.gc.statistics().last_minor_cards_scanned, 3);
    let array = fx.root(array_slot);
    for &index in &indices {
        let item = unsafe { mutator::load_array_item(&fx.gc, array, index) };
        assert_eq!(fx.value(item), index);
    }
    assert_heap_valid(&mut fx, "after card rescan");
}

/// **Bug this finds:** arrays promoted from the nursery without a card
/// area, falling back to whole-object rescans.
#[test]
fn test_promoted_array_gets_cards() {
    // Arrange
    let mut fx = GcFixture::new();
    let array_slot = fx.rooted_ref_array(500);
    assert!(fx.gc.is_young(fx.root(array_slot)));
    fx.gc.collect(0);

    // Act
    let node = fx.node(42);
    let array = fx.root(array_slot);
    unsafe { mutator::store_array_item(&mut fx.gc, array, 400, node) };
    fx.gc.collect(0);

    // Assert
    assert_eq!(fx.gc.statistics().last_minor_cards_scanned, 1);
    let item = unsafe { mutator::load_array_item(&fx.gc, array, 400) };
    assert_eq!(fx.value(item), 42);
}

// ============================================================================
// ARRAY COPIES
// ============================================================================

/// **Bug this finds:** raw copies of young references into an old array
/// going unrecorded.
#[test]
fn test_arraycopy_carries_card_bits() {
    // Arrange
    let mut fx = GcFixture::new();
    let src_slot = fx.rooted_ref_array(2000);
    let dst_slot = fx.rooted_ref_array(2000);
    let node = fx.node(5);
    let src = fx.root(src_slot);
    unsafe { mutator::store_array_item(&mut fx.gc, src, 5, node) };

    // Act
    let dst = fx.root(dst_slot);
    unsafe { mutator::arraycopy(&mut fx.gc, src, dst, 0, 0, 2000) };
    fx.gc.collect(0);

    // Assert
    let from_src = unsafe { mutator::load_array_item(&fx.gc, src, 5) };
    let from_dst = unsafe { mutator::load_array_item(&fx.gc, dst, 5) };
    assert_old(&fx, from_dst, "copied item");
    assert_eq!(from_src, from_dst, "both arrays must see the same copy");
    assert_eq!(fx.value(from_dst), 5);
    assert_eq!(fx.gc.statistics().last_minor_cards_scanned, 2);
}

/// **Bug this finds:** offset copies taking the raw path without recording
/// the destination.
#[test]
fn test_arraycopy_with_offsets_falls_back_to_item_barriers() {
    // Arrange
    let mut fx = GcFixture::new();
    let src_slot = fx.rooted_ref_array(2000);
    let dst_slot = fx.rooted_ref_array(2000);
    for i in 0..4 {
        let node = fx.node(i);
        let src = fx.root(src_slot);
        unsafe { mutator::store_array_item(&mut fx.gc, src, 10 + i, node) };
    }

    // Act
    let (src, dst) = (fx.root(src_slot), fx.root(dst_slot));
    let raw = unsafe { fx.gc.writebarrier_before_copy(src, dst, 10, 700, 4) };
    assert!(!raw, "cards cannot be shifted: per-item barriers required");
    unsafe { mutator::arraycopy(&mut fx.gc, src, dst, 10, 700, 4) };
    fx.gc.collect(0);

    // Assert
    for i in 0..4 {
        let item = unsafe { mutator::load_array_item(&fx.gc, dst, 700 + i) };
        assert_old(&fx, item, "copied item");
        assert_eq!(fx.value(item), i);
    }
}

/// **Bug this finds:** overlapping copies within one array clobbering
/// items before reading them.
#[test]
fn test_arraycopy_overlapping_young_array() {
    // Arrange
    let mut fx = GcFixture::new();
    let array_slot = fx.rooted_ref_array(8);
    for i in 0..6 {
        let node = fx.node(i);
        let array = fx.root(array_slot);
        unsafe { mutator::store_array_item(&mut fx.gc, array, i, node) };
    }

    // Act
    let array = fx.root(array_slot);
    unsafe { mutator::arraycopy(&mut fx.gc, array, array, 0, 2, 6) };

    // Assert
    let values: Vec<usize> = (0..8)
        .map(|i| fx.value(unsafe { mutator::load_array_item(&fx.gc, array, i) }))
        .collect();
    assert_eq!(values, vec![0, 1, 0, 1, 2, 3, 4, 5]);
    fx.gc.collect(0);
    assert_heap_valid(&mut fx, "after overlapping copy");
}

// ============================================================================
// PREBUILT OBJECTS
// ============================================================================

/// **Bug this finds:** prebuilt objects not traced once the mutator stores
/// a heap reference into them.
#[test]
fn test_prebuilt_object_keeps_heap_object_alive() {
    // Arrange
    let mut storage = Box::new([0u64; 4]);
    let prebuilt = storage.as_mut_ptr() as usize;
    let mut fx = GcFixture::new();
    unsafe { fx.gc.init_prebuilt(prebuilt, fx.types.node) };
    fx.roots.add_prebuilt_slot(prebuilt + 8 + NODE_LEFT);

    // Act
    let child = fx.node(77);
    fx.set_left(prebuilt, child);
    fx.gc.collect(1);
    fx.gc.collect(1);

    // Assert
    let child = fx.left(prebuilt);
    assert_old(&fx, child, "child of a prebuilt object");
    assert_eq!(fx.value(child), 77);
    assert!(!fx.is_marked(prebuilt), "prebuilt marks must be cleared between cycles");
    assert_heap_valid(&mut fx, "with a prebuilt object");
    drop(fx);
    drop(storage);
}

/// **Bug this finds:** a raw array copy of old references into a prebuilt
/// array leaving it unregistered, so major marking never traces it and
/// what it holds is swept while reachable.
#[test]
fn test_arraycopy_into_prebuilt_array_keeps_items_alive() {
    // Arrange: header, length word, four items
    let mut storage = Box::new([0u64; 6]);
    storage[1] = 4;
    let prebuilt = storage.as_mut_ptr() as usize;
    let mut fx = GcFixture::new();
    unsafe { fx.gc.init_prebuilt(prebuilt, fx.types.ref_array) };

    let src_slot = fx.rooted_ref_array(4);
    let child = fx.node(77);
    let src = fx.root(src_slot);
    unsafe { mutator::store_array_item(&mut fx.gc, src, 0, child) };
    fx.gc.collect(1);

    // Act
    let src = fx.root(src_slot);
    assert_old(&fx, src, "source array");
    unsafe { mutator::arraycopy(&mut fx.gc, src, prebuilt, 0, 0, 4) };
    fx.roots.set(src_slot, 0);
    fx.gc.collect(1);
    fx.gc.collect(1);

    // reuse whatever the cycles freed
    for value in 0..2000 {
        fx.rooted_node(value);
    }
    fx.gc.collect(0);

    // Assert
    let child = unsafe { mutator::load_array_item(&fx.gc, prebuilt, 0) };
    assert_old(&fx, child, "item of a prebuilt array");
    assert_eq!(fx.value(child), 77, "item was freed and its block reused");
    assert_heap_valid(&mut fx, "after copying into a prebuilt array");
    drop(fx);
    drop(storage);
}
