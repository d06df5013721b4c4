use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::cursor::{Direction, seek_alive};
use crate::{Slot, StablePool};

/// Iterator over shared references to the items of a [`StablePool`], in slot order.
///
/// Created by [`StablePool::iter()`] or by iterating over `&StablePool`.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<u32>::new();
/// pool.extend([10, 20, 30]);
///
/// let mut iter = pool.iter();
/// assert_eq!(iter.len(), 3);
/// assert_eq!(iter.next(), Some(&10));
/// assert_eq!(iter.next_back(), Some(&30));
/// assert_eq!(iter.next(), Some(&20));
/// assert_eq!(iter.next(), None);
/// ```
#[derive(Debug)]
pub struct Iter<'p, T> {
    pool: &'p StablePool<T>,

    /// Last slot yielded from the front, initially the start sentinel.
    front: NonNull<Slot<T>>,

    /// Last slot yielded from the back, initially the end sentinel.
    back: NonNull<Slot<T>>,

    remaining: usize,
}

impl<'p, T> Iter<'p, T> {
    pub(crate) fn new(pool: &'p StablePool<T>) -> Self {
        Self {
            pool,
            front: pool.outer_first(),
            back: pool.outer_last(),
            remaining: pool.len(),
        }
    }
}

impl<'p, T> Iterator for Iter<'p, T> {
    type Item = &'p T;

    fn next(&mut self) -> Option<Self::Item> {
        // The front and back never cross because we stop once every item has been yielded.
        self.remaining = self.remaining.checked_sub(1)?;

        self.front = seek_alive(self.pool, self.front, Direction::Forward);

        // SAFETY: `seek_alive` returned a slot of the pool we borrow and, because an item
        // remained, that slot is alive rather than the end sentinel.
        Some(unsafe { self.pool.slot_unchecked(self.front) }.value())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.remaining = self.remaining.checked_sub(1)?;

        self.back = seek_alive(self.pool, self.back, Direction::Backward);

        // SAFETY: `seek_alive` returned a slot of the pool we borrow and, because an item
        // remained, that slot is alive rather than the start sentinel.
        Some(unsafe { self.pool.slot_unchecked(self.back) }.value())
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

/// Iterator over exclusive references to the items of a [`StablePool`], in slot order.
///
/// Created by [`StablePool::iter_mut()`] or by iterating over `&mut StablePool`.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<u32>::new();
/// pool.extend([1, 2, 3]);
///
/// for value in pool.iter_mut() {
///     *value *= 10;
/// }
///
/// assert_eq!(pool.iter().copied().collect::<Vec<_>>(), [10, 20, 30]);
/// ```
#[derive(Debug)]
pub struct IterMut<'p, T> {
    /// Only slot states and links are read through this. Values are reached through raw
    /// projections so that references already handed out stay valid.
    pool: &'p StablePool<T>,

    front: NonNull<Slot<T>>,
    back: NonNull<Slot<T>>,
    remaining: usize,

    _items: PhantomData<&'p mut T>,
}

impl<'p, T> IterMut<'p, T> {
    pub(crate) fn new(pool: &'p mut StablePool<T>) -> Self {
        let pool: &'p StablePool<T> = pool;

        Self {
            pool,
            front: pool.outer_first(),
            back: pool.outer_last(),
            remaining: pool.len(),
            _items: PhantomData,
        }
    }
}

impl<'p, T> Iterator for IterMut<'p, T> {
    type Item = &'p mut T;

    fn next(&mut self) -> Option<Self::Item> {
        self.remaining = self.remaining.checked_sub(1)?;

        self.front = seek_alive(self.pool, self.front, Direction::Forward);

        // SAFETY: The slot is an alive slot of the pool, which we borrowed exclusively when
        // the iterator was created. Each slot is yielded at most once, so the reference is
        // unique.
        Some(unsafe { Slot::value_mut_at(self.front) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.remaining = self.remaining.checked_sub(1)?;

        self.back = seek_alive(self.pool, self.back, Direction::Backward);

        // SAFETY: The slot is an alive slot of the pool, which we borrowed exclusively when
        // the iterator was created. Each slot is yielded at most once, so the reference is
        // unique.
        Some(unsafe { Slot::value_mut_at(self.back) })
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<T> FusedIterator for IterMut<'_, T> {}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::arithmetic_side_effects,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use std::num::NonZero;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(
        Iter<'static, u32>: Iterator,
        DoubleEndedIterator,
        ExactSizeIterator,
        FusedIterator,
        Clone
    );
    assert_impl_all!(
        IterMut<'static, u32>: Iterator,
        DoubleEndedIterator,
        ExactSizeIterator,
        FusedIterator
    );

    fn small_pool() -> StablePool<u32> {
        StablePool::<u32>::builder()
            .initial_block_size(NonZero::new(2).unwrap())
            .block_increment(1)
            .build()
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut pool = small_pool();

        assert_eq!(pool.iter().next(), None);
        assert_eq!(pool.iter().next_back(), None);
        assert_eq!(pool.iter_mut().next(), None);
        assert_eq!(pool.iter().len(), 0);
    }

    #[test]
    fn forward_and_backward_across_blocks() {
        let mut pool = small_pool();
        pool.extend(0..20);

        assert!(pool.block_count() > 3);
        assert_eq!(pool.iter().copied().collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());
        assert_eq!(
            pool.iter().rev().copied().collect::<Vec<_>>(),
            (0..20).rev().collect::<Vec<_>>()
        );
    }

    #[test]
    fn skips_free_slots_including_whole_blocks() {
        let mut pool = small_pool();
        let positions: Vec<_> = (0..9).map(|value| pool.insert(value).unwrap()).collect();

        // Blocks are [0, 1] [2, 3, 4] [5, 6, 7, 8]; this empties the middle block entirely.
        for &position in &positions[1..=5] {
            pool.remove(position);
        }

        assert_eq!(pool.iter().copied().collect::<Vec<_>>(), [0, 6, 7, 8]);
        assert_eq!(pool.iter().rev().copied().collect::<Vec<_>>(), [8, 7, 6, 0]);
    }

    #[test]
    fn meeting_in_the_middle_yields_each_item_once() {
        let mut pool = small_pool();
        pool.extend(0..7);

        let mut iter = pool.iter();
        let mut seen = Vec::new();

        while let Some(&value) = iter.next() {
            seen.push(value);

            if let Some(&value) = iter.next_back() {
                seen.push(value);
            }
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());

        // Fused.
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn exact_size_tracks_consumption() {
        let mut pool = small_pool();
        pool.extend(0..5);

        let mut iter = pool.iter();
        assert_eq!(iter.len(), 5);

        _ = iter.next();
        _ = iter.next_back();

        assert_eq!(iter.len(), 3);
        assert_eq!(iter.size_hint(), (3, Some(3)));
    }

    #[test]
    fn iter_mut_modifies_in_place() {
        let mut pool = small_pool();
        pool.extend(0..10);

        for value in pool.iter_mut().rev() {
            *value += 100;
        }

        assert_eq!(pool.iter().copied().collect::<Vec<_>>(), (100..110).collect::<Vec<_>>());
    }

    #[test]
    fn iter_mut_references_can_coexist() {
        let mut pool = small_pool();
        pool.extend(0..4);

        let mut references: Vec<&mut u32> = pool.iter_mut().collect();

        for reference in &mut references {
            **reference *= 2;
        }

        assert_eq!(pool.iter().copied().collect::<Vec<_>>(), [0, 2, 4, 6]);
    }

    #[test]
    fn cloned_iterator_continues_independently() {
        let mut pool = small_pool();
        pool.extend(0..3);

        let mut iter = pool.iter();
        _ = iter.next();

        let clone = iter.clone();

        assert_eq!(iter.copied().collect::<Vec<_>>(), [1, 2]);
        assert_eq!(clone.copied().collect::<Vec<_>>(), [1, 2]);
    }
}
