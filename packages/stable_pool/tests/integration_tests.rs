//! Integration tests for `stable_pool` exercising the public API end to end.
//!
//! The scenarios walk a default-configured pool through its first few growth steps, removal
//! while iterating and full drain-and-refill cycles.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use stable_pool::{EmplaceError, Position, StablePool};

fn forward(pool: &StablePool<u32>) -> Vec<u32> {
    let mut values = Vec::new();
    let mut cursor = pool.begin();

    while cursor != pool.end() {
        values.push(*cursor.get().expect("cursor between begin and end rests on an item"));
        cursor.move_next();
    }

    values
}

fn backward(pool: &StablePool<u32>) -> Vec<u32> {
    let mut values = Vec::new();
    let mut cursor = pool.rend();

    while cursor != pool.rbegin() {
        values.push(*cursor.get().expect("cursor between rend and rbegin rests on an item"));
        cursor.move_prev();
    }

    values
}

fn fill(pool: &mut StablePool<u32>, values: impl IntoIterator<Item = u32>) -> Vec<Position<u32>> {
    values
        .into_iter()
        .map(|value| pool.insert(value).unwrap())
        .collect()
}

#[test]
fn fresh_pool_is_empty_with_one_block() {
    let pool = StablePool::<u32>::new();

    assert_eq!(pool.capacity(), 16);
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.size(), 0);
    assert!(pool.begin() == pool.end());
    assert!(pool.rend() == pool.rbegin());
    assert_eq!(pool.begin().get(), None);
}

#[test]
fn filling_first_block_keeps_insertion_order() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..16);

    assert_eq!(pool.size(), 16);
    assert_eq!(pool.capacity(), 16);
    assert_eq!(pool.block_count(), 1);
    assert_eq!(forward(&pool), (0..16).collect::<Vec<_>>());
}

#[test]
fn seventeenth_item_grows_by_second_block() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..17);

    assert_eq!(pool.capacity(), 48);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(forward(&pool), (0..17).collect::<Vec<_>>());
    assert_eq!(backward(&pool), (0..17).rev().collect::<Vec<_>>());
}

#[test]
fn round_trip_in_both_directions() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..200);

    assert_eq!(forward(&pool), (0..200).collect::<Vec<_>>());
    assert_eq!(backward(&pool), (0..200).rev().collect::<Vec<_>>());
    assert_eq!(pool.iter().copied().collect::<Vec<_>>(), forward(&pool));
    assert_eq!(pool.iter().rev().copied().collect::<Vec<_>>(), backward(&pool));
}

#[test]
fn remove_every_fourth_while_iterating() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..128);

    assert_eq!(pool.capacity(), 160);
    assert_eq!(pool.block_count(), 4);

    let mut cursor = pool.begin_mut();

    while let Some(&value) = cursor.current() {
        if value % 4 == 0 {
            assert_eq!(cursor.take_current(), Some(value));
        }

        cursor.move_next();
    }

    let expected: Vec<_> = (0..128).filter(|value| value % 4 != 0).collect();

    assert_eq!(forward(&pool), expected);
    assert_eq!(pool.size(), 96);
    assert_eq!(pool.capacity(), 160);
}

#[test]
fn drain_and_refill_reuses_slots_most_recent_first() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..128);
    pool.retain(|value| *value % 4 != 0);

    // Remove the rest front to back, remembering where each item lived.
    let mut removed_positions = Vec::new();
    let mut cursor = pool.begin_mut();

    while cursor.current().is_some() {
        removed_positions.push(cursor.position().unwrap());
        cursor.remove_current();
        cursor.move_next();
    }

    assert_eq!(pool.size(), 0);
    assert!(pool.is_empty());
    assert_eq!(pool.capacity(), 160);
    assert!(pool.begin() == pool.end());

    let refilled = fill(&mut pool, 0..96);

    // The last slot freed is the first one reused.
    let expected_positions: Vec<_> = removed_positions.iter().rev().copied().collect();
    assert_eq!(refilled, expected_positions);

    assert_eq!(pool.capacity(), 160);
    assert_eq!(forward(&pool), (0..96).rev().collect::<Vec<_>>());
}

#[test]
fn drain_backward_then_refill_restores_forward_order() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..128);

    let mut cursor = pool.rend_mut();

    while cursor.current().is_some() {
        cursor.remove_current();
        cursor.move_prev();
    }

    assert!(pool.is_empty());

    fill(&mut pool, 0..128);

    assert_eq!(pool.capacity(), 160);
    assert_eq!(forward(&pool), (0..128).collect::<Vec<_>>());
}

#[test]
fn insert_then_remove_is_neutral() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..10);

    let len_before = pool.len();
    let capacity_before = pool.capacity();

    let position = pool.insert(99).unwrap();
    pool.remove(position);

    assert_eq!(pool.len(), len_before);
    assert_eq!(pool.capacity(), capacity_before);
    assert_eq!(forward(&pool), (0..10).collect::<Vec<_>>());
}

#[test]
fn remove_never_shrinks_capacity() {
    let mut pool = StablePool::<u32>::new();
    let positions = fill(&mut pool, 0..100);
    let capacity = pool.capacity();

    for position in positions {
        pool.remove(position);
        assert_eq!(pool.capacity(), capacity);
    }
}

/// A payload whose construction fails on demand.
#[derive(Debug)]
struct Picky(u32);

impl Picky {
    fn try_new(value: u32, fail: bool) -> Result<Self, &'static str> {
        if fail {
            Err("refused to construct")
        } else {
            Ok(Self(value))
        }
    }
}

#[test]
fn failed_construction_at_growth_point_changes_nothing() {
    let mut pool = StablePool::<Picky>::new();

    for value in 0..48 {
        pool.try_emplace_with(|| Picky::try_new(value, false)).unwrap();
    }

    // Both blocks are full now, so the next insertion needs a third block.
    let len_before = pool.len();
    let capacity_before = pool.capacity();
    let order_before: Vec<u32> = pool.iter().map(|item| item.0).collect();

    let result = pool.try_emplace_with(|| Picky::try_new(48, true));

    assert!(matches!(result, Err(EmplaceError::Construction("refused to construct"))));
    assert_eq!(pool.len(), len_before);
    assert_eq!(pool.capacity(), capacity_before);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.iter().map(|item| item.0).collect::<Vec<_>>(), order_before);
    assert_eq!(
        pool.iter().rev().map(|item| item.0).collect::<Vec<_>>(),
        order_before.iter().rev().copied().collect::<Vec<_>>()
    );

    // Growth still follows the usual schedule afterwards.
    pool.try_emplace_with(|| Picky::try_new(48, false)).unwrap();
    assert_eq!(pool.capacity(), 16 + 32 + 48);
}

#[test]
fn panicking_construction_at_growth_point_changes_nothing() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..16);

    let result =
        catch_unwind(AssertUnwindSafe(|| pool.emplace_with(|| panic!("constructor blew up"))));

    assert!(matches!(result, Err(_)));
    assert_eq!(pool.len(), 16);
    assert_eq!(pool.capacity(), 16);
    assert_eq!(forward(&pool), (0..16).collect::<Vec<_>>());
    assert_eq!(backward(&pool), (0..16).rev().collect::<Vec<_>>());
}

#[test]
fn items_do_not_move_when_pool_grows() {
    let mut pool = StablePool::<[u8; 64]>::new();

    let first = pool.insert([1; 64]).unwrap();
    let address: *const [u8; 64] = pool.get(first);

    for _ in 0..500 {
        _ = pool.insert([0; 64]).unwrap();
    }

    assert!(ptr::eq(address, pool.get(first)));
}

#[test]
fn cursor_at_position_walks_both_ways() {
    let mut pool = StablePool::<u32>::new();
    let positions = fill(&mut pool, 0..40);

    let mut cursor = pool.cursor_at(positions[16]);
    assert_eq!(cursor.get(), Some(&16));

    cursor.move_prev();
    assert_eq!(cursor.get(), Some(&15));

    cursor.move_next();
    cursor.move_next();
    assert_eq!(cursor.get(), Some(&17));
    assert_eq!(cursor.position(), Some(positions[17]));
}

#[test]
fn sentinels_do_not_move_outward() {
    let mut pool = StablePool::<u32>::new();
    fill(&mut pool, 0..3);

    let mut end = pool.end();
    end.move_next();
    assert!(end == pool.end());

    let mut start = pool.rbegin();
    start.move_prev();
    assert!(start == pool.rbegin());

    start.move_next();
    assert!(start == pool.begin());
}
