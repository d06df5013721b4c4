use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use crate::Slot;

/// Identifies one slot of a [`StablePool`][crate::StablePool].
///
/// Positions are returned when an item is inserted and by cursors that rest on an item. They can
/// be copied and stored freely and are accepted by [`get()`][1], [`get_mut()`][2],
/// [`take()`][3] and [`remove()`][4] of the pool that created them.
///
/// # Reuse
///
/// Slots are recycled: once the item at a position is removed, a later insertion may land in the
/// same slot, after which the old position refers to the new item. Using a position whose item
/// was removed and not replaced panics. Using a position with a pool other than the one that
/// created it also panics.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<i32>::new();
///
/// let first = pool.insert(42).unwrap();
/// let second = pool.insert(24).unwrap();
///
/// // Positions can be copied and stored.
/// let stored = vec![first, second];
///
/// for &position in &stored {
///     println!("Item: {}", pool.get(position));
/// }
///
/// pool.remove(first);
/// assert_eq!(pool.len(), 1);
/// ```
///
/// [1]: crate::StablePool::get
/// [2]: crate::StablePool::get_mut
/// [3]: crate::StablePool::take
/// [4]: crate::StablePool::remove
pub struct Position<T> {
    slot_ptr: NonNull<Slot<T>>,
}

impl<T> Position<T> {
    #[must_use]
    pub(crate) fn new(slot_ptr: NonNull<Slot<T>>) -> Self {
        Self { slot_ptr }
    }

    #[must_use]
    pub(crate) fn slot_ptr(self) -> NonNull<Slot<T>> {
        self.slot_ptr
    }
}

impl<T> Clone for Position<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Position<T> {}

impl<T> PartialEq for Position<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot_ptr == other.slot_ptr
    }
}

impl<T> Eq for Position<T> {}

impl<T> Hash for Position<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot_ptr.hash(state);
    }
}

impl<T> fmt::Debug for Position<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position")
            .field("slot_ptr", &self.slot_ptr)
            .finish()
    }
}

// SAFETY: A position is only an address. It is never dereferenced on its own, only by the pool
// that owns the slot after checking that the slot belongs to it, under that pool's borrow.
unsafe impl<T> Send for Position<T> {}

// SAFETY: See `Send` above; a shared position exposes nothing but its address.
unsafe impl<T> Sync for Position<T> {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;

    use static_assertions::assert_impl_all;

    use crate::StablePool;

    use super::*;

    assert_impl_all!(Position<String>: Send, Sync, Copy, Eq, Hash, fmt::Debug);
    assert_impl_all!(Position<Cell<u8>>: Send, Sync);

    #[test]
    fn positions_of_distinct_items_differ() {
        let mut pool = StablePool::<u32>::new();

        let a = pool.insert(1).unwrap();
        let b = pool.insert(1).unwrap();

        assert_ne!(a, b);

        let set: HashSet<_> = [a, b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn reused_slot_yields_equal_position() {
        let mut pool = StablePool::<u32>::new();

        let a = pool.insert(1).unwrap();
        pool.remove(a);
        let b = pool.insert(2).unwrap();

        assert_eq!(a, b);
        assert_eq!(*pool.get(a), 2);
    }
}
