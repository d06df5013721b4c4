use std::any::type_name;
use std::fmt;
use std::ptr::{self, NonNull};

use crate::{Position, Slot, SlotState, StablePool};

/// Travel direction of a cursor step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// Where a cursor rests, as far as stepping is concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Place {
    /// The leading boundary of the first block.
    OuterFirst,

    /// The trailing boundary of the last block.
    OuterLast,

    /// A boundary joined to a boundary of the neighboring block.
    InteriorJoin,

    /// A free or alive slot.
    NotBoundary,
}

fn place_of<T>(pool: &StablePool<T>, slot_ptr: NonNull<Slot<T>>) -> Place {
    // SAFETY: Cursor slot pointers always belong to the pool they were created from, and the
    // borrow of the pool excludes concurrent writes to slot state.
    let state = unsafe { Slot::state_at(slot_ptr) };

    debug_assert_ne!(state, SlotState::Uninitialized);

    if state != SlotState::Boundary {
        Place::NotBoundary
    } else if slot_ptr == pool.outer_first() {
        Place::OuterFirst
    } else if slot_ptr == pool.outer_last() {
        Place::OuterLast
    } else {
        Place::InteriorJoin
    }
}

/// Moves one slot within the current block.
///
/// Cursors only ever rest on interior slots or on the two outer sentinels, and a join is always
/// reached from the inside of its block. Therefore every physical step lands inside the block
/// it starts from.
fn physical_step<T>(slot_ptr: NonNull<Slot<T>>, direction: Direction) -> NonNull<Slot<T>> {
    match direction {
        // SAFETY: See the function comment - the neighbor is in the same allocation.
        Direction::Forward => unsafe { slot_ptr.add(1) },
        // SAFETY: See the function comment - the neighbor is in the same allocation.
        Direction::Backward => unsafe { slot_ptr.sub(1) },
    }
}

/// The primitive step. Crossing a join is a hop to the paired boundary followed by an ordinary
/// step, so the hop itself is never a resting place. The outer sentinels do not move outward.
fn step<T>(
    pool: &StablePool<T>,
    slot_ptr: NonNull<Slot<T>>,
    direction: Direction,
) -> NonNull<Slot<T>> {
    match (direction, place_of(pool, slot_ptr)) {
        (_, Place::NotBoundary)
        | (Direction::Forward, Place::OuterFirst)
        | (Direction::Backward, Place::OuterLast) => physical_step(slot_ptr, direction),
        (Direction::Backward, Place::OuterFirst) | (Direction::Forward, Place::OuterLast) => {
            slot_ptr
        }
        (_, Place::InteriorJoin) => {
            // SAFETY: The slot belongs to the pool and is a boundary, so it holds a link. The
            // borrow of the pool excludes concurrent writes.
            let partner = unsafe { Slot::link_at(slot_ptr) }
                .expect("a boundary between two blocks always links to its neighbor");

            physical_step(partner, direction)
        }
    }
}

/// Steps until landing on an alive slot or on the terminal sentinel for `direction`.
pub(crate) fn seek_alive<T>(
    pool: &StablePool<T>,
    from: NonNull<Slot<T>>,
    direction: Direction,
) -> NonNull<Slot<T>> {
    let terminal = match direction {
        Direction::Forward => pool.outer_last(),
        Direction::Backward => pool.outer_first(),
    };

    let mut current = from;

    loop {
        current = step(pool, current, direction);

        if current == terminal {
            return current;
        }

        // SAFETY: The slot belongs to the pool and the borrow of the pool excludes concurrent
        // writes to slot state.
        if unsafe { Slot::state_at(current) } == SlotState::Alive {
            return current;
        }
    }
}

/// A read-only cursor over the slots of a [`StablePool`], walking the pool's blocks as one
/// bidirectional sequence and skipping free slots.
///
/// A cursor rests either on an item or on one of the two outer sentinels:
///
/// * [`StablePool::rbegin()`] is the sentinel before the first item. Moving backward from it
///   stays in place.
/// * [`StablePool::end()`] is the sentinel after the last item. Moving forward from it stays in
///   place.
///
/// Cursors are cheap to copy. Two cursors are equal if they rest on the same slot.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<u32>::new();
/// pool.extend([1, 2, 3]);
///
/// let mut cursor = pool.begin();
/// let mut seen = Vec::new();
///
/// while cursor != pool.end() {
///     seen.push(*cursor.get().unwrap());
///     cursor.move_next();
/// }
///
/// assert_eq!(seen, [1, 2, 3]);
/// ```
pub struct Cursor<'p, T> {
    pool: &'p StablePool<T>,
    slot_ptr: NonNull<Slot<T>>,
}

impl<'p, T> Cursor<'p, T> {
    #[must_use]
    pub(crate) fn new(pool: &'p StablePool<T>, slot_ptr: NonNull<Slot<T>>) -> Self {
        Self { pool, slot_ptr }
    }

    /// Moves to the next item, or to the [end sentinel][StablePool::end] if there is none.
    pub fn move_next(&mut self) {
        self.slot_ptr = seek_alive(self.pool, self.slot_ptr, Direction::Forward);
    }

    /// Moves to the previous item, or to the [start sentinel][StablePool::rbegin] if there is
    /// none.
    pub fn move_prev(&mut self) {
        self.slot_ptr = seek_alive(self.pool, self.slot_ptr, Direction::Backward);
    }

    /// The item the cursor rests on, or `None` if the cursor rests on a sentinel.
    #[must_use]
    pub fn get(&self) -> Option<&'p T> {
        // SAFETY: The slot belongs to the pool we borrow.
        let slot = unsafe { self.pool.slot_unchecked(self.slot_ptr) };

        slot.is_alive().then(|| slot.value())
    }

    /// The position of the item the cursor rests on, or `None` if the cursor rests on a sentinel.
    #[must_use]
    pub fn position(&self) -> Option<Position<T>> {
        self.get().map(|_| Position::new(self.slot_ptr))
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> PartialEq for Cursor<'_, T> {
    /// # Panics
    ///
    /// Panics if the cursors belong to different pools.
    fn eq(&self, other: &Self) -> bool {
        assert!(
            ptr::eq(self.pool, other.pool),
            "compared cursors of two different pools of {}",
            type_name::<T>()
        );

        self.slot_ptr == other.slot_ptr
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("slot_ptr", &self.slot_ptr)
            .finish_non_exhaustive()
    }
}

/// A cursor over the slots of a [`StablePool`] that can modify and remove the items it visits.
///
/// Moves exactly like [`Cursor`]. After [`remove_current()`][Self::remove_current] the cursor
/// stays on the now free slot and yields nothing until it is moved again, so a remove-and-advance
/// loop visits every item exactly once.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<u32>::new();
/// pool.extend(0..10);
///
/// let mut cursor = pool.begin_mut();
///
/// while let Some(value) = cursor.current() {
///     if value % 2 == 0 {
///         cursor.remove_current();
///     }
///     cursor.move_next();
/// }
///
/// assert_eq!(pool.len(), 5);
/// assert!(pool.iter().all(|value| value % 2 == 1));
/// ```
pub struct CursorMut<'p, T> {
    pool: &'p mut StablePool<T>,
    slot_ptr: NonNull<Slot<T>>,
}

impl<'p, T> CursorMut<'p, T> {
    #[must_use]
    pub(crate) fn new(pool: &'p mut StablePool<T>, slot_ptr: NonNull<Slot<T>>) -> Self {
        Self { pool, slot_ptr }
    }

    /// Moves to the next item, or to the [end sentinel][StablePool::end] if there is none.
    pub fn move_next(&mut self) {
        self.slot_ptr = seek_alive(self.pool, self.slot_ptr, Direction::Forward);
    }

    /// Moves to the previous item, or to the [start sentinel][StablePool::rbegin] if there is
    /// none.
    pub fn move_prev(&mut self) {
        self.slot_ptr = seek_alive(self.pool, self.slot_ptr, Direction::Backward);
    }

    /// The item the cursor rests on, or `None` if the cursor rests on a sentinel or on a slot
    /// whose item was just removed.
    #[must_use]
    pub fn current(&self) -> Option<&T> {
        // SAFETY: The slot belongs to the pool we borrow.
        let slot = unsafe { self.pool.slot_unchecked(self.slot_ptr) };

        slot.is_alive().then(|| slot.value())
    }

    /// Exclusive access to the item the cursor rests on, if any.
    #[must_use]
    pub fn current_mut(&mut self) -> Option<&mut T> {
        // SAFETY: The slot belongs to the pool we borrow exclusively.
        let slot = unsafe { self.pool.slot_unchecked_mut(self.slot_ptr) };

        if slot.is_alive() {
            Some(slot.value_mut())
        } else {
            None
        }
    }

    /// The position of the item the cursor rests on, if any.
    #[must_use]
    pub fn position(&self) -> Option<Position<T>> {
        self.current().map(|_| Position::new(self.slot_ptr))
    }

    /// Removes the item the cursor rests on from the pool, dropping it in place.
    ///
    /// The cursor does not move. Returns `false` if there was no item under the cursor.
    pub fn remove_current(&mut self) -> bool {
        if self.current().is_none() {
            return false;
        }

        // SAFETY: The slot belongs to the pool we borrow exclusively and we just checked that
        // it is alive.
        unsafe {
            self.pool.remove_unchecked(self.slot_ptr);
        }

        true
    }

    /// A read-only cursor at the same place, borrowing from this one.
    #[must_use]
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor::new(self.pool, self.slot_ptr)
    }
}

impl<T: Unpin> CursorMut<'_, T> {
    /// Removes the item the cursor rests on from the pool and returns it.
    ///
    /// Only available for [`Unpin`] items, because the item is moved out of the slot it may
    /// have been pinned in. The cursor does not move. Returns `None` if there is no item under
    /// the cursor.
    pub fn take_current(&mut self) -> Option<T> {
        if self.current().is_none() {
            return None;
        }

        // SAFETY: The slot belongs to the pool we borrow exclusively and we just checked that
        // it is alive. `T: Unpin`, so moving the item is allowed even if it was pinned.
        Some(unsafe { self.pool.take_unchecked(self.slot_ptr) })
    }
}

impl<T> fmt::Debug for CursorMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorMut")
            .field("slot_ptr", &self.slot_ptr)
            .finish_non_exhaustive()
    }
}
