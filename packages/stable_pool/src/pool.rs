use std::any::type_name;
use std::convert::Infallible;
use std::fmt;
use std::num::NonZero;
use std::pin::Pin;
use std::ptr::NonNull;
use std::thread;

use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::cursor::{Direction, seek_alive};
use crate::{
    Block, Cursor, CursorMut, DropPolicy, EmplaceError, Error, Iter, IterMut, Link, Position,
    Result, Slot, StablePoolBuilder, link_boundaries,
};

/// A growable object pool whose items never move once inserted.
///
/// Storage is a chain of fixed-size blocks. When all slots are taken, a new block is appended;
/// existing blocks are never resized, moved or released while the pool lives, so references to
/// items remain valid across growth and [`Position`]s keep denoting the same slot. Removed items
/// leave their slot on a free list and the most recently freed slot is the first to be reused.
///
/// Block sizes grow arithmetically: block `k` has `initial_block_size + k * block_increment`
/// slots (16, 32, 48, ... by default).
///
/// # Traversal
///
/// Items are visited in slot order, not insertion order, via [`iter()`][Self::iter] or via
/// cursors. [`begin()`][Self::begin]/[`end()`][Self::end] and
/// [`rend()`][Self::rend]/[`rbegin()`][Self::rbegin] give the forward and backward start and stop
/// positions; [`begin_mut()`][Self::begin_mut] gives a cursor that can also remove items while
/// walking.
///
/// # Failure atomicity
///
/// [`try_emplace_with()`][Self::try_emplace_with] builds the item with a caller-supplied
/// constructor that may fail (or panic). If it does, the pool is left exactly as it was before
/// the call, including releasing a block that was appended only for this item.
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) if the items are, but has no internal synchronization and
/// is not [`Sync`]. Wrap it in a `Mutex` to share it between threads.
///
/// # Example
///
/// ```rust
/// use stable_pool::StablePool;
///
/// let mut pool = StablePool::<String>::new();
///
/// let hello = pool.insert("Hello".to_string()).unwrap();
/// let world = pool.insert("World".to_string()).unwrap();
///
/// let address_before = pool.get(hello) as *const String;
///
/// // Grow the pool well past its first block.
/// for index in 0..100 {
///     pool.insert(index.to_string()).unwrap();
/// }
///
/// // Existing items did not move.
/// assert_eq!(pool.get(hello) as *const String, address_before);
///
/// pool.remove(world);
/// assert_eq!(pool.len(), 101);
/// ```
pub struct StablePool<T> {
    /// Blocks in traversal order. The `Vec` only holds block headers; the slots live in
    /// separate allocations that do not move when the `Vec` reallocates.
    blocks: Vec<Block<T>>,

    /// Head of the intrusive free list threading every free slot of every block.
    free_head: Link<T>,

    len: usize,

    /// Sum of the nominal sizes of all blocks.
    capacity: usize,

    next_block_size: NonZero<usize>,
    block_increment: usize,

    /// Leading boundary of the first block.
    outer_first: NonNull<Slot<T>>,

    /// Trailing boundary of the last block.
    outer_last: NonNull<Slot<T>>,

    drop_policy: DropPolicy,
}

/// Pool state captured right before a block is appended, enough to undo the append.
#[derive(Debug)]
struct GrowthCheckpoint<T> {
    free_head: Link<T>,
    capacity: usize,
    next_block_size: NonZero<usize>,
    outer_last: NonNull<Slot<T>>,
}

impl<T> StablePool<T> {
    pub(crate) fn new_inner(
        initial_block_size: NonZero<usize>,
        block_increment: usize,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        let first_block = Block::new(initial_block_size)?;

        let mut pool = Self {
            blocks: Vec::new(),
            free_head: None,
            len: 0,
            capacity: 0,
            next_block_size: initial_block_size,
            block_increment,
            outer_first: first_block.leading_boundary(),
            outer_last: first_block.trailing_boundary(),
            drop_policy,
        };

        _ = pool.append_block(first_block);

        Ok(pool)
    }

    /// Creates a new [`StablePool`] with the default configuration: one block of 16 slots,
    /// each following block 16 slots larger than the previous one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<String>::new();
    ///
    /// assert_eq!(pool.len(), 0);
    /// assert_eq!(pool.capacity(), 16);
    /// assert!(pool.begin() == pool.end());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the first block cannot be allocated.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`StablePool`] with a custom configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::num::NonZero;
    ///
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<u64>::builder()
    ///     .initial_block_size(NonZero::new(64).unwrap())
    ///     .block_increment(0)
    ///     .build();
    ///
    /// assert_eq!(pool.capacity(), 64);
    /// ```
    pub fn builder() -> StablePoolBuilder<T> {
        StablePoolBuilder::new()
    }

    /// The number of items in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// The number of items in the pool. Same as [`len()`][Self::len].
    #[must_use]
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Whether the pool holds no items. An empty pool still holds its capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of items the pool can hold without appending another block.
    ///
    /// Capacity only ever grows.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u8>::new();
    /// assert_eq!(pool.capacity(), 16);
    ///
    /// pool.extend(0..17);
    /// assert_eq!(pool.capacity(), 16 + 32);
    /// ```
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of blocks backing the pool.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The number of slots the next appended block will have.
    #[must_use]
    pub fn next_block_size(&self) -> NonZero<usize> {
        self.next_block_size
    }

    /// Appends blocks until at least `additional` more items fit without further growth.
    ///
    /// Blocks follow the usual size schedule, so the pool may end up with more spare capacity
    /// than requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhaustion`] if a block cannot be allocated. Blocks appended
    /// before the failing one are kept.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// pool.reserve(40).unwrap();
    ///
    /// // 16 + 32 is the first capacity that fits 40 items.
    /// assert_eq!(pool.capacity(), 48);
    /// ```
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(Error::ResourceExhaustion { slots: usize::MAX })?;

        while self.capacity < required {
            _ = self.push_block()?;
        }

        Ok(())
    }

    /// Inserts an item built by `constructor`, which may fail.
    ///
    /// If the pool has no free slot, a block is appended first. If `constructor` returns an
    /// error or panics, that block is released again and every observable property of the pool
    /// (length, capacity, traversal order, which slot the next insertion uses) is the same as
    /// before the call.
    ///
    /// # Errors
    ///
    /// Returns [`EmplaceError::Construction`] with the constructor's error, or
    /// [`EmplaceError::Pool`] if a block was needed and could not be allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::{EmplaceError, StablePool};
    ///
    /// let mut pool = StablePool::<u16>::new();
    ///
    /// let ok = pool.try_emplace_with(|| "42".parse::<u16>());
    /// assert!(ok.is_ok());
    ///
    /// let failed = pool.try_emplace_with(|| "not a number".parse::<u16>());
    /// assert!(matches!(failed, Err(EmplaceError::Construction(_))));
    ///
    /// assert_eq!(pool.len(), 1);
    /// ```
    pub fn try_emplace_with<E, F>(&mut self, constructor: F) -> Result<Position<T>, EmplaceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let checkpoint = if self.free_head.is_none() {
            Some(self.push_block()?)
        } else {
            None
        };

        // Undoes the growth if the constructor fails or panics.
        let guard = scopeguard::guard((self, checkpoint), |(pool, checkpoint)| {
            if let Some(checkpoint) = checkpoint {
                pool.rollback_growth(checkpoint);
            }
        });

        let value = constructor().map_err(EmplaceError::Construction)?;

        let (pool, _) = ScopeGuard::into_inner(guard);

        Ok(pool.construct_at_free_head(value))
    }

    /// Inserts an item built by `constructor`.
    ///
    /// If `constructor` panics, the pool is left as it was before the call, the same as with
    /// [`try_emplace_with()`][Self::try_emplace_with].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhaustion`] if a block was needed and could not be allocated.
    pub fn emplace_with<F>(&mut self, constructor: F) -> Result<Position<T>>
    where
        F: FnOnce() -> T,
    {
        self.try_emplace_with(|| Ok::<T, Infallible>(constructor()))
            .map_err(|error| match error {
                EmplaceError::Pool(error) => error,
                EmplaceError::Construction(never) => match never {},
            })
    }

    /// Inserts an item and returns its position.
    ///
    /// The item lands in the most recently freed slot, or in the first slot of a newly appended
    /// block if there is no free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhaustion`] if a block was needed and could not be allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<i32>::new();
    ///
    /// let position = pool.insert(42).unwrap();
    /// assert_eq!(*pool.get(position), 42);
    /// ```
    pub fn insert(&mut self, value: T) -> Result<Position<T>> {
        self.emplace_with(|| value)
    }

    /// Removes the item at `position`, dropping it in place.
    ///
    /// The slot becomes the first one reused by the next insertion. Capacity is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was already removed.
    pub fn remove(&mut self, position: Position<T>) {
        self.assert_live_position(position, "remove");

        // SAFETY: Checked right above.
        unsafe {
            self.remove_unchecked(position.slot_ptr());
        }
    }

    /// Shared access to the item at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was removed.
    #[must_use]
    pub fn get(&self, position: Position<T>) -> &T {
        self.assert_live_position(position, "get");

        // SAFETY: Checked right above.
        unsafe { self.slot_unchecked(position.slot_ptr()) }.value()
    }

    /// Exclusive access to the item at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was removed.
    #[must_use]
    pub fn get_mut(&mut self, position: Position<T>) -> &mut T {
        self.assert_live_position(position, "get_mut");

        // SAFETY: Checked right above.
        unsafe { self.slot_unchecked_mut(position.slot_ptr()) }.value_mut()
    }

    /// Pinned exclusive access to the item at `position`.
    ///
    /// Items never move while they are in the pool, so they can be treated as pinned.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was removed.
    #[must_use]
    pub fn get_pin_mut(&mut self, position: Position<T>) -> Pin<&mut T> {
        let value = self.get_mut(position);

        // SAFETY: Items are only ever moved out of their slot by `take()` and
        // `CursorMut::take_current()`, both of which require `T: Unpin`. Every other way out of
        // the pool drops the item in place, and a block is only released after all its items
        // were dropped.
        unsafe { Pin::new_unchecked(value) }
    }

    /// The first item, or [`end()`][Self::end] if the pool is empty.
    #[must_use]
    pub fn begin(&self) -> Cursor<'_, T> {
        Cursor::new(self, seek_alive(self, self.outer_first, Direction::Forward))
    }

    /// The sentinel after the last item. It never holds an item.
    #[must_use]
    pub fn end(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.outer_last)
    }

    /// The sentinel before the first item, where backward traversal stops. It never holds an
    /// item.
    #[must_use]
    pub fn rbegin(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.outer_first)
    }

    /// The last item, where backward traversal starts, or [`rbegin()`][Self::rbegin] if the pool
    /// is empty.
    #[must_use]
    pub fn rend(&self) -> Cursor<'_, T> {
        Cursor::new(self, seek_alive(self, self.outer_last, Direction::Backward))
    }

    /// Like [`begin()`][Self::begin] but the cursor can modify and remove items.
    #[must_use]
    pub fn begin_mut(&mut self) -> CursorMut<'_, T> {
        let slot_ptr = seek_alive(self, self.outer_first, Direction::Forward);
        CursorMut::new(self, slot_ptr)
    }

    /// Like [`rend()`][Self::rend] but the cursor can modify and remove items.
    #[must_use]
    pub fn rend_mut(&mut self) -> CursorMut<'_, T> {
        let slot_ptr = seek_alive(self, self.outer_last, Direction::Backward);
        CursorMut::new(self, slot_ptr)
    }

    /// A cursor resting on the item at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was removed.
    #[must_use]
    pub fn cursor_at(&self, position: Position<T>) -> Cursor<'_, T> {
        self.assert_live_position(position, "cursor_at");

        Cursor::new(self, position.slot_ptr())
    }

    /// A mutable cursor resting on the item at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was removed.
    #[must_use]
    pub fn cursor_mut_at(&mut self, position: Position<T>) -> CursorMut<'_, T> {
        self.assert_live_position(position, "cursor_mut_at");

        CursorMut::new(self, position.slot_ptr())
    }

    /// Iterates over shared references to all items in slot order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// pool.extend([1, 2, 3]);
    ///
    /// assert_eq!(pool.iter().sum::<u32>(), 6);
    /// assert_eq!(pool.iter().rev().copied().collect::<Vec<_>>(), [3, 2, 1]);
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Iterates over exclusive references to all items in slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut::new(self)
    }

    /// Removes every item for which `keep` returns `false`, visiting items in slot order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<u32>::new();
    /// pool.extend(0..128);
    ///
    /// pool.retain(|value| *value % 4 != 0);
    ///
    /// assert_eq!(pool.len(), 96);
    /// assert_eq!(pool.capacity(), 160);
    /// ```
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        let mut cursor = self.begin_mut();

        while let Some(value) = cursor.current_mut() {
            if !keep(value) {
                cursor.remove_current();
            }

            cursor.move_next();
        }
    }

    /// Removes every item. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.retain(|_| false);
    }

    #[must_use]
    pub(crate) fn outer_first(&self) -> NonNull<Slot<T>> {
        self.outer_first
    }

    #[must_use]
    pub(crate) fn outer_last(&self) -> NonNull<Slot<T>> {
        self.outer_last
    }

    /// # Safety
    ///
    /// `slot_ptr` must point to a slot in one of this pool's blocks.
    #[must_use]
    pub(crate) unsafe fn slot_unchecked(&self, slot_ptr: NonNull<Slot<T>>) -> &Slot<T> {
        // SAFETY: The caller guarantees the slot is ours; our blocks keep every slot initialized
        // and the shared borrow of the pool excludes writes.
        unsafe { slot_ptr.as_ref() }
    }

    /// # Safety
    ///
    /// `slot_ptr` must point to a slot in one of this pool's blocks.
    #[allow(
        clippy::needless_pass_by_ref_mut,
        reason = "the exclusive borrow of the pool is what makes the returned reference unique"
    )]
    #[must_use]
    pub(crate) unsafe fn slot_unchecked_mut(
        &mut self,
        mut slot_ptr: NonNull<Slot<T>>,
    ) -> &mut Slot<T> {
        // SAFETY: The caller guarantees the slot is ours; our blocks keep every slot initialized
        // and the exclusive borrow of the pool excludes any other access.
        unsafe { slot_ptr.as_mut() }
    }

    /// Drops the item at `slot_ptr` in place, pushing the slot onto the free list.
    ///
    /// # Safety
    ///
    /// `slot_ptr` must point to an alive slot in one of this pool's blocks.
    pub(crate) unsafe fn remove_unchecked(&mut self, slot_ptr: NonNull<Slot<T>>) {
        let next_free = self.push_free(slot_ptr);

        // SAFETY: Forwarding the ownership requirement to the caller.
        let slot = unsafe { self.slot_unchecked_mut(slot_ptr) };

        // The bookkeeping is already done, so a panicking `Drop` leaves a consistent pool.
        slot.drop_value_and_free(next_free);
    }

    /// Moves the item at `slot_ptr` out of the pool, pushing the slot onto the free list.
    ///
    /// # Safety
    ///
    /// `slot_ptr` must point to an alive slot in one of this pool's blocks. The item must not be
    /// pinned, which callers ensure by requiring `T: Unpin`.
    #[must_use]
    pub(crate) unsafe fn take_unchecked(&mut self, slot_ptr: NonNull<Slot<T>>) -> T {
        let next_free = self.push_free(slot_ptr);

        // SAFETY: Forwarding the ownership requirement to the caller.
        let slot = unsafe { self.slot_unchecked_mut(slot_ptr) };

        slot.take_value(next_free)
    }

    /// Makes `slot_ptr` the head of the free list and accounts for the removed item. Returns the
    /// previous head, which the slot must link to.
    fn push_free(&mut self, slot_ptr: NonNull<Slot<T>>) -> Link<T> {
        let next_free = self.free_head.replace(slot_ptr);

        self.len = self
            .len
            .checked_sub(1)
            .expect("the slot was alive, so the pool cannot have been empty");

        trace!(
            item_type = type_name::<T>(),
            len = self.len,
            "freed slot pushed onto free list"
        );

        next_free
    }

    fn assert_live_position(&self, position: Position<T>, operation: &str) {
        let slot_ptr = position.slot_ptr();

        assert!(
            self.blocks
                .iter()
                .any(|block| block.contains_interior(slot_ptr)),
            "{operation}() position does not belong to this pool of {}",
            type_name::<T>()
        );

        // SAFETY: We just verified that the slot is ours.
        let slot = unsafe { self.slot_unchecked(slot_ptr) };

        assert!(
            slot.is_alive(),
            "{operation}() position refers to a removed item in pool of {}",
            type_name::<T>()
        );
    }

    fn construct_at_free_head(&mut self, value: T) -> Position<T> {
        let slot_ptr = self
            .free_head
            .expect("free list cannot be empty after growth succeeded");

        // SAFETY: Every slot on our free list is in one of our blocks.
        let slot = unsafe { self.slot_unchecked_mut(slot_ptr) };

        let next_free = slot.link();
        slot.construct(value);

        self.free_head = next_free;
        self.len = self
            .len
            .checked_add(1)
            .expect("guarded by capacity, which cannot exceed virtual memory");

        Position::new(slot_ptr)
    }

    /// Allocates a block of `next_block_size` slots and appends it.
    fn push_block(&mut self) -> Result<GrowthCheckpoint<T>> {
        let block = Block::new(self.next_block_size)?;

        Ok(self.append_block(block))
    }

    /// Splices `block` onto the end of the chain and prepends its local free list onto ours.
    fn append_block(&mut self, mut block: Block<T>) -> GrowthCheckpoint<T> {
        let checkpoint = GrowthCheckpoint {
            free_head: self.free_head,
            capacity: self.capacity,
            next_block_size: self.next_block_size,
            outer_last: self.outer_last,
        };

        if let Some(previous) = self.blocks.last() {
            // SAFETY: Both are boundary slots of live blocks and no references to them exist.
            unsafe {
                link_boundaries(previous.trailing_boundary(), block.leading_boundary());
            }
        } else {
            self.outer_first = block.leading_boundary();
        }

        self.outer_last = block.trailing_boundary();

        let last_interior_index = block.nominal_size().get();
        block.slot_mut(last_interior_index).set_link(self.free_head);
        self.free_head = Some(block.first_interior());

        let nominal_size = block.nominal_size();

        self.capacity = self
            .capacity
            .checked_add(nominal_size.get())
            .expect("capacity cannot exceed virtual memory because every slot was allocated");
        self.next_block_size = self.next_block_size.saturating_add(self.block_increment);

        self.blocks.push(block);

        debug!(
            item_type = type_name::<T>(),
            block_index = self.blocks.len().wrapping_sub(1),
            nominal_size = nominal_size.get(),
            capacity = self.capacity,
            "appended block to stable pool"
        );

        checkpoint
    }

    /// Releases the last block and restores the state captured before it was appended.
    ///
    /// Only valid while nothing has been constructed into the released block.
    fn rollback_growth(&mut self, checkpoint: GrowthCheckpoint<T>) {
        let block = self
            .blocks
            .pop()
            .expect("rollback only happens right after a block was appended");

        debug_assert!(
            self.blocks.last().is_some_and(|previous| {
                previous.trailing_boundary() == checkpoint.outer_last
            }),
            "the first block is never rolled back"
        );

        self.outer_last = checkpoint.outer_last;

        // SAFETY: The restored outer sentinel is the trailing boundary of our last block.
        let outer_last = unsafe { self.slot_unchecked_mut(checkpoint.outer_last) };
        outer_last.set_link(None);

        self.free_head = checkpoint.free_head;
        self.capacity = checkpoint.capacity;
        self.next_block_size = checkpoint.next_block_size;

        debug!(
            item_type = type_name::<T>(),
            nominal_size = block.nominal_size().get(),
            capacity = self.capacity,
            "rolled back block appended for a failed insertion"
        );

        drop(block);

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Walks every block and the free list, asserting every structural invariant of the pool.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        use crate::SlotState;

        let first_block = self
            .blocks
            .first()
            .expect("a pool always has at least one block");
        let last_block = self
            .blocks
            .last()
            .expect("a pool always has at least one block");

        assert_eq!(
            self.outer_first,
            first_block.leading_boundary(),
            "outer_first is not the leading boundary of the first block in pool of {}",
            type_name::<T>()
        );
        assert_eq!(
            self.outer_last,
            last_block.trailing_boundary(),
            "outer_last is not the trailing boundary of the last block in pool of {}",
            type_name::<T>()
        );

        let mut observed_alive: usize = 0;
        let mut observed_free: usize = 0;
        let mut observed_capacity: usize = 0;

        for (block_index, block) in self.blocks.iter().enumerate() {
            let last_index = block.slot_count().wrapping_sub(1);

            observed_capacity = observed_capacity
                .checked_add(block.nominal_size().get())
                .expect("guarded by allocation succeeding");

            for index in [0, last_index] {
                assert_eq!(
                    block.slot(index).state(),
                    SlotState::Boundary,
                    "slot {index} of block {block_index} is not a boundary in pool of {}",
                    type_name::<T>()
                );
            }

            let expected_leading_link = block_index
                .checked_sub(1)
                .and_then(|previous| self.blocks.get(previous))
                .map(Block::trailing_boundary);
            let expected_trailing_link = block_index
                .checked_add(1)
                .and_then(|next| self.blocks.get(next))
                .map(Block::leading_boundary);

            assert_eq!(
                block.slot(0).link(),
                expected_leading_link,
                "leading boundary of block {block_index} has a wrong link in pool of {}",
                type_name::<T>()
            );
            assert_eq!(
                block.slot(last_index).link(),
                expected_trailing_link,
                "trailing boundary of block {block_index} has a wrong link in pool of {}",
                type_name::<T>()
            );

            for index in 1..last_index {
                match block.slot(index).state() {
                    SlotState::Alive => {
                        observed_alive = observed_alive.wrapping_add(1);
                    }
                    SlotState::Free => {
                        observed_free = observed_free.wrapping_add(1);
                    }
                    state => panic!(
                        "interior slot {index} of block {block_index} is {state:?} in pool of {}",
                        type_name::<T>()
                    ),
                }
            }
        }

        assert_eq!(
            self.len,
            observed_alive,
            "len does not match the number of alive slots in pool of {}",
            type_name::<T>()
        );
        assert_eq!(
            self.capacity,
            observed_capacity,
            "capacity does not match the sum of block sizes in pool of {}",
            type_name::<T>()
        );

        let mut free_list_length: usize = 0;
        let mut current = self.free_head;

        while let Some(slot_ptr) = current {
            assert!(
                self.blocks
                    .iter()
                    .any(|block| block.contains_interior(slot_ptr)),
                "free list leads outside the interior of the blocks in pool of {}",
                type_name::<T>()
            );

            // SAFETY: We just verified that the slot is ours.
            let slot = unsafe { self.slot_unchecked(slot_ptr) };

            assert_eq!(
                slot.state(),
                SlotState::Free,
                "free list threads a non-free slot in pool of {}",
                type_name::<T>()
            );

            free_list_length = free_list_length.wrapping_add(1);

            assert!(
                free_list_length <= observed_free,
                "free list is longer than the number of free slots (cycle?) in pool of {}",
                type_name::<T>()
            );

            current = slot.link();
        }

        assert_eq!(
            free_list_length,
            observed_free,
            "free list does not thread every free slot in pool of {}",
            type_name::<T>()
        );
    }
}

impl<T: Unpin> StablePool<T> {
    /// Removes the item at `position` and returns it.
    ///
    /// Only available for [`Unpin`] items, because it moves the item out of the slot that
    /// [`get_pin_mut()`][Self::get_pin_mut] may have pinned it in. Use
    /// [`remove()`][Self::remove] to drop any item in place.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not belong to this pool or its item was already removed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stable_pool::StablePool;
    ///
    /// let mut pool = StablePool::<String>::new();
    /// let position = pool.insert("Hello".to_string()).unwrap();
    ///
    /// assert_eq!(pool.take(position), "Hello");
    /// assert!(pool.is_empty());
    /// ```
    #[must_use]
    pub fn take(&mut self, position: Position<T>) -> T {
        self.assert_live_position(position, "take");

        // SAFETY: Checked right above. `T: Unpin`, so moving the item is allowed even if it
        // was pinned.
        unsafe { self.take_unchecked(position.slot_ptr()) }
    }
}

impl<T> Default for StablePool<T> {
    /// Creates a new [`StablePool`] with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the first block cannot be allocated.
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for StablePool<T> {
    fn drop(&mut self) {
        let was_empty = self.is_empty();

        // Drops any remaining items and releases the blocks.
        self.blocks.clear();

        // We check after releasing the memory. If we are already panicking, another panic would
        // only obscure the first one.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                was_empty,
                "dropped a non-empty pool of {} whose drop policy requires it to be empty",
                type_name::<T>()
            );
        }
    }
}

impl<T> Extend<T> for StablePool<T> {
    /// # Panics
    ///
    /// Panics if a block cannot be allocated.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            _ = self.insert(value).expect(
                "we do not intend to handle allocation failure as a real possibility - OOM is panic",
            );
        }
    }
}

impl<'p, T> IntoIterator for &'p StablePool<T> {
    type Item = &'p T;
    type IntoIter = Iter<'p, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'p, T> IntoIterator for &'p mut StablePool<T> {
    type Item = &'p mut T;
    type IntoIter = IterMut<'p, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T> fmt::Debug for StablePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StablePool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("block_count", &self.blocks.len())
            .field("next_block_size", &self.next_block_size)
            .field("block_increment", &self.block_increment)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

// SAFETY: The raw pointers all point into blocks the pool owns exclusively, so the pool can
// move between threads whenever its items can.
unsafe impl<T: Send> Send for StablePool<T> {}
