//! A growable object pool whose items never move, with bidirectional traversal that skips removed
//! items.
//!
//! This crate provides [`StablePool`], a container that stores values in a chain of fixed-size
//! blocks. Blocks are never moved or released while the pool lives, so a reference to an item
//! stays valid no matter how much the pool grows afterwards.
//!
//! # Key Features
//!
//! - **Stable addresses**: Items never move once inserted, so they can also be accessed pinned
//! - **Slot reuse**: Removed items free their slot for the next insertion, most recent first
//! - **Arithmetic growth**: Blocks of 16, 32, 48, ... slots by default, configurable via
//!   [`StablePoolBuilder`]
//! - **Failure-atomic insertion**: If building a value fails or panics, the pool is left exactly
//!   as it was, including releasing a block appended only for that value
//! - **Bidirectional traversal**: [`Iter`], [`IterMut`] and the [`Cursor`]/[`CursorMut`] types
//!   walk all blocks as one sequence, skipping free slots and whole empty blocks
//! - **Removal during traversal**: [`CursorMut::remove_current()`] removes items while walking
//! - **Flexible drop policies**: Configure behavior when the pool is dropped with remaining items
//! - **Thread mobility**: The pool can be moved between threads (but not shared without
//!   synchronization)
//!
//! # Examples
//!
//! ## Basic usage
//!
//! ```rust
//! use stable_pool::StablePool;
//!
//! let mut pool = StablePool::<String>::new();
//!
//! let greeting = pool.insert("Hello".to_string()).unwrap();
//! pool.get_mut(greeting).push_str(", World");
//!
//! assert_eq!(pool.get(greeting), "Hello, World");
//!
//! pool.remove(greeting);
//! assert!(pool.is_empty());
//! ```
//!
//! ## Fallible construction
//!
//! ```rust
//! use stable_pool::{EmplaceError, StablePool};
//!
//! let mut pool = StablePool::<u8>::new();
//! pool.extend(0..16);
//!
//! // The pool is full, so this would need a new block. The failed construction releases it.
//! let result = pool.try_emplace_with(|| "300".parse::<u8>());
//!
//! assert!(matches!(result, Err(EmplaceError::Construction(_))));
//! assert_eq!(pool.capacity(), 16);
//! ```
//!
//! ## Traversal and removal while walking
//!
//! ```rust
//! use stable_pool::StablePool;
//!
//! let mut pool = StablePool::<u32>::new();
//! pool.extend(0..100);
//!
//! let mut cursor = pool.begin_mut();
//!
//! while let Some(&value) = cursor.current() {
//!     if value % 4 == 0 {
//!         cursor.remove_current();
//!     }
//!     cursor.move_next();
//! }
//!
//! assert_eq!(pool.len(), 75);
//! assert_eq!(pool.iter().next(), Some(&1));
//! assert_eq!(pool.iter().next_back(), Some(&99));
//! ```

mod block;
mod builder;
mod cursor;
mod drop_policy;
mod error;
mod iter;
mod pool;
mod position;
mod slot;

pub(crate) use block::*;
pub use builder::*;
pub use cursor::{Cursor, CursorMut};
pub use drop_policy::*;
pub(crate) use error::Result;
pub use error::{EmplaceError, Error};
pub use iter::{Iter, IterMut};
pub use pool::StablePool;
pub use position::Position;
pub(crate) use slot::*;
