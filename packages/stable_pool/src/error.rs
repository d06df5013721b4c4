use thiserror::Error;

/// Errors that can occur when the pool needs to obtain more storage.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Memory for a new block could not be obtained, either because the allocator refused the
    /// request or because the block size does not fit in the address space.
    ///
    /// The pool is left exactly as it was before the operation that attempted to grow it.
    #[error("could not allocate a block of {slots} slots")]
    ResourceExhaustion {
        /// Number of slots (including the two boundary slots) the block would have held.
        slots: usize,
    },
}

/// Errors returned by [`StablePool::try_emplace_with()`][crate::StablePool::try_emplace_with].
///
/// Whichever variant is returned, the pool is left in the same observable state as before the
/// call: same length, same capacity, same traversal order.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmplaceError<E> {
    /// The value constructor supplied by the caller reported failure.
    #[error("value construction failed: {0}")]
    Construction(E),

    /// The pool needed to grow and could not.
    #[error(transparent)]
    Pool(#[from] Error),
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
