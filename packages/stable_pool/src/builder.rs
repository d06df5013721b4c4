use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{DropPolicy, Result, StablePool};

/// Number of slots in the first block unless configured otherwise.
const DEFAULT_INITIAL_BLOCK_SIZE: NonZero<usize> = NonZero::new(16).expect("16 is not zero");

/// How many slots each block has over the previous one unless configured otherwise.
const DEFAULT_BLOCK_INCREMENT: usize = 16;

/// Builder for creating an instance of [`StablePool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`StablePool::new()`][1] starts with a block of 16 slots
/// and makes every following block 16 slots larger than the one before.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use stable_pool::{DropPolicy, StablePool};
///
/// let pool = StablePool::<u32>::builder()
///     .initial_block_size(NonZero::new(4).unwrap())
///     .block_increment(4)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build();
///
/// assert_eq!(pool.capacity(), 4);
/// assert_eq!(pool.next_block_size().get(), 8);
/// ```
///
/// [1]: StablePool::new
#[must_use]
pub struct StablePoolBuilder<T> {
    initial_block_size: NonZero<usize>,
    block_increment: usize,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for StablePoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StablePoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("initial_block_size", &self.initial_block_size)
            .field("block_increment", &self.block_increment)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> StablePoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            initial_block_size: DEFAULT_INITIAL_BLOCK_SIZE,
            block_increment: DEFAULT_BLOCK_INCREMENT,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the number of slots in the first block, which is allocated when the pool is built.
    pub fn initial_block_size(mut self, slots: NonZero<usize>) -> Self {
        self.initial_block_size = slots;
        self
    }

    /// Sets how many more slots each appended block has than the block before it.
    ///
    /// Zero makes every block the same size as the first one.
    pub fn block_increment(mut self, slots: usize) -> Self {
        self.block_increment = slots;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how
    /// to treat remaining items in the pool when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use stable_pool::{DropPolicy, StablePool};
    ///
    /// let pool = StablePool::<u32>::builder()
    ///     .drop_policy(DropPolicy::MustNotDropItems)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool with the specified configuration, allocating its first block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhaustion`][crate::Error::ResourceExhaustion] if the first
    /// block cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use stable_pool::StablePool;
    ///
    /// let result = StablePool::<u64>::builder()
    ///     .initial_block_size(NonZero::new(usize::MAX).unwrap())
    ///     .try_build();
    ///
    /// assert!(matches!(result, Err(_)));
    /// ```
    pub fn try_build(self) -> Result<StablePool<T>> {
        StablePool::new_inner(
            self.initial_block_size,
            self.block_increment,
            self.drop_policy,
        )
    }

    /// Builds the pool with the specified configuration, allocating its first block.
    ///
    /// # Panics
    ///
    /// Panics if the first block cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use stable_pool::StablePool;
    ///
    /// let pool = StablePool::<u32>::builder().build();
    /// ```
    #[must_use]
    pub fn build(self) -> StablePool<T> {
        self.try_build()
            .expect("we do not intend to handle allocation failure as a real possibility - OOM is panic")
    }
}
