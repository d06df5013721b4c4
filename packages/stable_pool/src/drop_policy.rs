/// Determines what happens to items still in the pool when the pool is dropped.
///
/// By default, remaining items are dropped together with the pool.
///
/// # Examples
///
/// ```
/// use stable_pool::{DropPolicy, StablePool};
///
/// // The drop policy is set at pool creation time.
/// let pool = StablePool::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Items still in the pool are dropped when the pool is dropped. This is the default.
    #[default]
    MayDropItems,

    /// The pool panics if it still contains items when it is dropped.
    ///
    /// Useful when items are referenced from unsafe code via their stable addresses and must be
    /// explicitly removed before the pool goes away.
    MustNotDropItems,
}
