use std::any::type_name;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// Intrusive link stored in free and boundary slots. `None` terminates the free list and marks
/// the two outer sentinels of a pool.
pub(crate) type Link<T> = Option<NonNull<Slot<T>>>;

/// Which interpretation of a slot's storage is currently valid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SlotState {
    /// Freshly allocated, storage holds nothing meaningful. Only exists while a block is being
    /// built.
    Uninitialized,

    /// Storage holds a link to the next free slot.
    Free,

    /// Storage holds a live value.
    Alive,

    /// Storage holds a link to the paired boundary slot of the neighboring block, or nothing
    /// if this is one of the two outer sentinels.
    Boundary,
}

union SlotStorage<T> {
    uninit: (),
    value: ManuallyDrop<T>,
    link: Link<T>,
}

/// One storage cell of a block. The same bytes hold either a value or a link, and the state tag
/// is the only thing that says which one. Every write to the storage goes through a method that
/// checks the tag first, so a live value is never overwritten without being dropped.
pub(crate) struct Slot<T> {
    state: SlotState,
    storage: SlotStorage<T>,
}

impl<T> Slot<T> {
    #[must_use]
    pub(crate) const fn uninitialized() -> Self {
        Self {
            state: SlotState::Uninitialized,
            storage: SlotStorage { uninit: () },
        }
    }

    #[must_use]
    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    #[must_use]
    pub(crate) fn is_alive(&self) -> bool {
        self.state == SlotState::Alive
    }

    /// Moves `value` into the slot, making it `Alive`.
    ///
    /// # Panics
    ///
    /// Panics if the slot already holds a live value.
    pub(crate) fn construct(&mut self, value: T) {
        assert!(
            self.state != SlotState::Alive,
            "construct() called on a slot that already holds a live {}",
            type_name::<T>()
        );

        self.storage = SlotStorage {
            value: ManuallyDrop::new(value),
        };
        self.state = SlotState::Alive;
    }

    /// # Panics
    ///
    /// Panics if the slot does not hold a live value.
    #[must_use]
    pub(crate) fn value(&self) -> &T {
        self.assert_alive("value");

        // SAFETY: The state tag says the value interpretation is the valid one.
        unsafe { &self.storage.value }
    }

    /// # Panics
    ///
    /// Panics if the slot does not hold a live value.
    #[must_use]
    pub(crate) fn value_mut(&mut self) -> &mut T {
        self.assert_alive("value_mut");

        // SAFETY: The state tag says the value interpretation is the valid one.
        unsafe { &mut self.storage.value }
    }

    /// Moves the value out of the slot and turns it into a free slot linking to `next_free`.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not hold a live value.
    #[must_use]
    pub(crate) fn take_value(&mut self, next_free: Link<T>) -> T {
        self.assert_alive("take_value");

        // SAFETY: The state tag says the value interpretation is the valid one.
        let slot_value = unsafe { &mut self.storage.value };

        // SAFETY: We flip the state away from `Alive` right below, so the moved-out value can
        // never be observed or dropped a second time.
        let value = unsafe { ManuallyDrop::take(slot_value) };

        self.state = SlotState::Free;
        self.storage.link = next_free;

        value
    }

    /// Drops the value where it lies and turns the slot into a free slot linking to `next_free`.
    ///
    /// The slot ends up free even if the value's `Drop` panics.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not hold a live value.
    pub(crate) fn drop_value_and_free(&mut self, next_free: Link<T>) {
        self.assert_alive("drop_value_and_free");

        let mut slot = scopeguard::guard(self, |slot| {
            slot.state = SlotState::Free;
            slot.storage.link = next_free;
        });

        slot.drop_value();
    }

    /// # Panics
    ///
    /// Panics if the slot is neither free nor a boundary.
    #[must_use]
    pub(crate) fn link(&self) -> Link<T> {
        assert!(
            matches!(self.state, SlotState::Free | SlotState::Boundary),
            "link() called on a {:?} slot of {}",
            self.state,
            type_name::<T>()
        );

        // SAFETY: Free and boundary slots always hold an initialized link.
        unsafe { self.storage.link }
    }

    /// Overwrites the link of a free or boundary slot.
    ///
    /// A live value found in the slot is dropped first and the slot becomes free.
    ///
    /// # Panics
    ///
    /// Panics if the slot is uninitialized.
    pub(crate) fn set_link(&mut self, link: Link<T>) {
        if self.state == SlotState::Alive {
            self.drop_value();
            self.state = SlotState::Free;
        }

        assert!(
            matches!(self.state, SlotState::Free | SlotState::Boundary),
            "set_link() called on a {:?} slot of {}",
            self.state,
            type_name::<T>()
        );

        self.storage.link = link;
    }

    /// Switches the slot to a link-carrying state.
    ///
    /// Values only enter a slot through [`construct()`][Self::construct], so `Alive` is not
    /// accepted here. A live value found in the slot is dropped first. A slot that did not carry
    /// a link before starts out with an empty one.
    ///
    /// # Panics
    ///
    /// Panics if `state` is `Alive` or `Uninitialized`.
    pub(crate) fn set_state(&mut self, state: SlotState) {
        assert!(
            matches!(state, SlotState::Free | SlotState::Boundary),
            "set_state({state:?}) is not a valid transition for a slot of {}",
            type_name::<T>()
        );

        match self.state {
            SlotState::Alive => {
                self.drop_value();
                self.storage.link = None;
            }
            SlotState::Uninitialized => {
                self.storage.link = None;
            }
            SlotState::Free | SlotState::Boundary => {}
        }

        self.state = state;
    }

    pub(crate) fn set_link_and_state(&mut self, link: Link<T>, state: SlotState) {
        self.set_state(state);
        self.set_link(link);
    }

    /// Reads the state of the slot behind `ptr` without creating a reference to the whole slot,
    /// so it stays valid while someone holds an exclusive reference to the slot's value.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an initialized slot whose state is not being written concurrently.
    #[must_use]
    pub(crate) unsafe fn state_at(ptr: NonNull<Self>) -> SlotState {
        // SAFETY: Forwarding the pointer validity requirement to the caller.
        let state_ptr = unsafe { &raw const (*ptr.as_ptr()).state };

        // SAFETY: The field pointer is derived from a valid slot pointer, so it is aligned and
        // points to an initialized state tag.
        unsafe { state_ptr.read() }
    }

    /// Reads the link of the free or boundary slot behind `ptr` without creating a reference to
    /// the whole slot.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an initialized slot that is not being written concurrently.
    ///
    /// # Panics
    ///
    /// Panics if the slot is neither free nor a boundary.
    #[must_use]
    pub(crate) unsafe fn link_at(ptr: NonNull<Self>) -> Link<T> {
        // SAFETY: Forwarding the pointer validity requirement to the caller.
        let state = unsafe { Self::state_at(ptr) };

        assert!(
            matches!(state, SlotState::Free | SlotState::Boundary),
            "link read from a {state:?} slot of {}",
            type_name::<T>()
        );

        // SAFETY: Forwarding the pointer validity requirement to the caller.
        let link_ptr = unsafe { &raw const (*ptr.as_ptr()).storage.link };

        // SAFETY: Free and boundary slots always hold an initialized link.
        unsafe { link_ptr.read() }
    }

    /// Creates an exclusive reference to the value of the slot behind `ptr` without creating a
    /// reference to the whole slot.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an `Alive` slot and the caller must guarantee that no other reference
    /// to the value exists for `'a`.
    #[must_use]
    pub(crate) unsafe fn value_mut_at<'a>(ptr: NonNull<Self>) -> &'a mut T {
        // SAFETY: Forwarding the pointer validity and aliasing requirements to the caller.
        let value_ptr = unsafe { &raw mut (*ptr.as_ptr()).storage.value };

        // SAFETY: The caller guarantees the slot is alive, so the value is initialized, and that
        // the reference is unique for its lifetime.
        unsafe { &mut *value_ptr }
    }

    fn assert_alive(&self, operation: &str) {
        assert!(
            self.state == SlotState::Alive,
            "{operation}() called on a {:?} slot of {}",
            self.state,
            type_name::<T>()
        );
    }

    fn drop_value(&mut self) {
        // SAFETY: Only called by code that checked the state is `Alive`.
        let slot_value = unsafe { &mut self.storage.value };

        // SAFETY: Callers switch the state away from `Alive` immediately after, so the dropped
        // value can never be observed or dropped again.
        unsafe { ManuallyDrop::drop(slot_value) };
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if self.state == SlotState::Alive {
            self.drop_value();
            self.state = SlotState::Free;
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Slot");
        debug.field("state", &self.state);

        if matches!(self.state, SlotState::Free | SlotState::Boundary) {
            debug.field("link", &self.link());
        }

        debug.finish_non_exhaustive()
    }
}
