use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::{self, NonNull};

use crate::{Error, Result, Slot, SlotState};

/// Number of boundary slots framing the interior of every block.
const BOUNDARY_SLOTS: usize = 2;

/// A fixed-size array of slots framed by two boundary sentinels.
///
/// ```text
/// [Boundary] [Free -> ] [Free -> ] ... [Free -> None] [Boundary]
///     0          1          2          nominal_size    nominal_size + 1
/// ```
///
/// Each block is one heap allocation that is never resized or moved, which is what lets the pool
/// hand out stable addresses and store raw links between slots of different blocks. The block
/// owns its slots: dropping it drops every value still alive in it.
pub(crate) struct Block<T> {
    first_slot_ptr: NonNull<Slot<T>>,

    /// Number of interior (value-carrying) slots.
    nominal_size: NonZero<usize>,

    _owns: PhantomData<Slot<T>>,
}

impl<T> Block<T> {
    /// Allocates a block with `nominal_size` interior slots.
    ///
    /// The interior is threaded into a local free list from the first interior slot to the last,
    /// which links to nothing. Both boundaries start with empty links. Nothing outside the new
    /// block is touched.
    pub(crate) fn new(nominal_size: NonZero<usize>) -> Result<Self> {
        let slot_count = nominal_size
            .get()
            .checked_add(BOUNDARY_SLOTS)
            .ok_or(Error::ResourceExhaustion { slots: usize::MAX })?;

        let layout = Self::layout(slot_count)?;

        // SAFETY: The layout is not zero-sized because a slot always contains its state tag and
        // there are at least three slots.
        let ptr = unsafe { alloc(layout) };

        let first_slot_ptr = NonNull::new(ptr.cast::<Slot<T>>())
            .ok_or(Error::ResourceExhaustion { slots: slot_count })?;

        for index in 0..slot_count {
            // SAFETY: The allocation has room for `slot_count` slots.
            let slot_ptr = unsafe { first_slot_ptr.add(index) };

            // SAFETY: The pointer is in bounds, aligned by `Layout::array` and valid for writes.
            unsafe {
                slot_ptr.write(Slot::uninitialized());
            }
        }

        let mut block = Self {
            first_slot_ptr,
            nominal_size,
            _owns: PhantomData,
        };

        block.slot_mut(0).set_link_and_state(None, SlotState::Boundary);
        block.slot_mut(block.last_index()).set_link_and_state(None, SlotState::Boundary);

        let last_interior_index = nominal_size.get();

        for index in 1..=last_interior_index {
            let next_free = if index == last_interior_index {
                None
            } else {
                // Cannot overflow, the next index is still inside the block.
                Some(block.slot_ptr(index.wrapping_add(1)))
            };

            block
                .slot_mut(index)
                .set_link_and_state(next_free, SlotState::Free);
        }

        Ok(block)
    }

    fn layout(slot_count: usize) -> Result<Layout> {
        Layout::array::<Slot<T>>(slot_count)
            .map_err(|_too_large| Error::ResourceExhaustion { slots: slot_count })
    }

    #[must_use]
    pub(crate) fn nominal_size(&self) -> NonZero<usize> {
        self.nominal_size
    }

    /// Number of slots including both boundaries.
    #[must_use]
    pub(crate) fn slot_count(&self) -> usize {
        // Cannot overflow, checked when the block was allocated.
        self.nominal_size.get().wrapping_add(BOUNDARY_SLOTS)
    }

    #[must_use]
    fn last_index(&self) -> usize {
        // Cannot underflow, there are always at least three slots.
        self.slot_count().wrapping_sub(1)
    }

    #[must_use]
    pub(crate) fn slot_ptr(&self, index: usize) -> NonNull<Slot<T>> {
        assert!(
            index < self.slot_count(),
            "slot {index} out of bounds in block of {} slots of {}",
            self.slot_count(),
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above.
        unsafe { self.first_slot_ptr.add(index) }
    }

    #[must_use]
    pub(crate) fn slot(&self, index: usize) -> &Slot<T> {
        let slot_ptr = self.slot_ptr(index);

        // SAFETY: Every slot was initialized in `new()` and the pointer is in bounds.
        unsafe { slot_ptr.as_ref() }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    #[must_use]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot<T> {
        let mut slot_ptr = self.slot_ptr(index);

        // SAFETY: Every slot was initialized in `new()`, the pointer is in bounds and we hold an
        // exclusive reference to the block.
        unsafe { slot_ptr.as_mut() }
    }

    #[must_use]
    pub(crate) fn leading_boundary(&self) -> NonNull<Slot<T>> {
        self.slot_ptr(0)
    }

    #[must_use]
    pub(crate) fn trailing_boundary(&self) -> NonNull<Slot<T>> {
        self.slot_ptr(self.last_index())
    }

    #[must_use]
    pub(crate) fn first_interior(&self) -> NonNull<Slot<T>> {
        self.slot_ptr(1)
    }

    #[must_use]
    pub(crate) fn last_interior(&self) -> NonNull<Slot<T>> {
        self.slot_ptr(self.nominal_size.get())
    }

    /// Whether `slot_ptr` is one of the interior slots of this block.
    #[must_use]
    pub(crate) fn contains_interior(&self, slot_ptr: NonNull<Slot<T>>) -> bool {
        slot_ptr >= self.first_interior() && slot_ptr <= self.last_interior()
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        let slot_count = self.slot_count();
        let first_slot_ptr = self.first_slot_ptr;

        let layout = Self::layout(slot_count)
            .expect("layout was valid when the block was allocated, so it still is");

        // Releases the memory even if dropping one of the values panics.
        let _dealloc = scopeguard::guard((), |()| {
            // SAFETY: The pointer came from `alloc()` with this same layout, and the slots have
            // all been dropped by the time the guard runs.
            unsafe {
                dealloc(first_slot_ptr.as_ptr().cast(), layout);
            }
        });

        let slots = ptr::slice_from_raw_parts_mut(first_slot_ptr.as_ptr(), slot_count);

        // SAFETY: Every slot was initialized in `new()` and we own them exclusively. Dropping a
        // slot drops its value if it is alive.
        unsafe {
            ptr::drop_in_place(slots);
        }
    }
}

impl<T> fmt::Debug for Block<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("first_slot_ptr", &self.first_slot_ptr)
            .field("nominal_size", &self.nominal_size)
            .finish()
    }
}

// SAFETY: The block exclusively owns its slots, so it can move between threads whenever the
// values in it can.
unsafe impl<T: Send> Send for Block<T> {}

/// Makes two boundary slots refer to each other, joining two neighboring blocks.
///
/// # Safety
///
/// Both pointers must point to boundary slots of live blocks, and no reference to either slot
/// may exist for the duration of the call.
///
/// # Panics
///
/// Panics if either slot is not a boundary.
pub(crate) unsafe fn link_boundaries<T>(mut first: NonNull<Slot<T>>, mut second: NonNull<Slot<T>>) {
    // SAFETY: Forwarding the validity and aliasing requirements to the caller.
    let first_slot = unsafe { first.as_mut() };
    assert_eq!(first_slot.state(), SlotState::Boundary);
    first_slot.set_link(Some(second));

    // SAFETY: Forwarding the validity and aliasing requirements to the caller. The reference to
    // the first slot is no longer used.
    let second_slot = unsafe { second.as_mut() };
    assert_eq!(second_slot.state(), SlotState::Boundary);
    second_slot.set_link(Some(first));
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use super::*;

    fn nz(value: usize) -> NonZero<usize> {
        NonZero::new(value).unwrap()
    }

    #[test]
    fn new_block_has_boundaries_and_local_free_list() {
        let block = Block::<u64>::new(nz(16)).unwrap();

        assert_eq!(block.nominal_size().get(), 16);
        assert_eq!(block.slot_count(), 18);

        assert_eq!(block.slot(0).state(), SlotState::Boundary);
        assert_eq!(block.slot(0).link(), None);
        assert_eq!(block.slot(17).state(), SlotState::Boundary);
        assert_eq!(block.slot(17).link(), None);

        for index in 1..=16 {
            assert_eq!(block.slot(index).state(), SlotState::Free);
        }

        // The local free list walks the interior in physical order.
        let mut current = Some(block.first_interior());
        let mut index = 1;

        while let Some(slot_ptr) = current {
            assert_eq!(slot_ptr, block.slot_ptr(index));
            // SAFETY: The slot belongs to the block, which is alive and not borrowed mutably.
            current = unsafe { Slot::link_at(slot_ptr) };
            index += 1;
        }

        assert_eq!(index, 17);
    }

    #[test]
    fn single_slot_block() {
        let block = Block::<u8>::new(nz(1)).unwrap();

        assert_eq!(block.first_interior(), block.last_interior());
        assert_eq!(block.slot(1).link(), None);
    }

    #[test]
    fn contains_interior_excludes_boundaries_and_foreign_slots() {
        let block = Block::<u32>::new(nz(4)).unwrap();
        let other = Block::<u32>::new(nz(4)).unwrap();

        assert!(!block.contains_interior(block.leading_boundary()));
        assert!(!block.contains_interior(block.trailing_boundary()));

        for index in 1..=4 {
            assert!(block.contains_interior(block.slot_ptr(index)));
            assert!(!block.contains_interior(other.slot_ptr(index)));
        }
    }

    #[test]
    fn link_boundaries_joins_both_directions() {
        let first = Block::<u32>::new(nz(2)).unwrap();
        let second = Block::<u32>::new(nz(3)).unwrap();

        // SAFETY: Both are boundary slots of live blocks and no references to them exist.
        unsafe {
            link_boundaries(first.trailing_boundary(), second.leading_boundary());
        }

        assert_eq!(first.slot(3).link(), Some(second.leading_boundary()));
        assert_eq!(second.slot(0).link(), Some(first.trailing_boundary()));
    }

    #[test]
    fn drop_drops_live_values() {
        struct Droppable {
            drops: Rc<Cell<usize>>,
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut block = Block::<Droppable>::new(nz(3)).unwrap();

        block.slot_mut(1).construct(Droppable {
            drops: Rc::clone(&drops),
        });
        block.slot_mut(3).construct(Droppable {
            drops: Rc::clone(&drops),
        });

        drop(block);

        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn drop_finishes_when_a_value_panics() {
        struct Droppable {
            drops: Rc<Cell<usize>>,
            panics: bool,
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
                assert!(!self.panics, "value refused to be dropped");
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut block = Block::<Droppable>::new(nz(3)).unwrap();

        block.slot_mut(1).construct(Droppable {
            drops: Rc::clone(&drops),
            panics: true,
        });
        block.slot_mut(3).construct(Droppable {
            drops: Rc::clone(&drops),
            panics: false,
        });

        let result = catch_unwind(AssertUnwindSafe(|| drop(block)));

        assert!(matches!(result, Err(_)));

        // The value after the panicking one was still dropped.
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn oversized_block_is_resource_exhaustion() {
        let result = Block::<u64>::new(nz(usize::MAX / 2));

        assert!(matches!(
            result,
            Err(Error::ResourceExhaustion { slots }) if slots == usize::MAX / 2 + 2
        ));
    }

    #[test]
    fn unrepresentable_block_is_resource_exhaustion() {
        let result = Block::<u64>::new(nz(usize::MAX));

        assert!(matches!(
            result,
            Err(Error::ResourceExhaustion { slots: usize::MAX })
        ));
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_slot_panics() {
        let block = Block::<u32>::new(nz(2)).unwrap();
        _ = block.slot_ptr(4);
    }
}
