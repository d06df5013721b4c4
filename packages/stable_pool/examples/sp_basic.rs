//! Basic usage of the `stable_pool` crate:
//!
//! * Creating a pool.
//! * Adding items.
//! * Retrieving items.
//! * Walking the pool with a cursor and removing items on the way.

use std::ptr;

use stable_pool::StablePool;

fn main() {
    let mut pool = StablePool::<String>::new();

    // Inserting an item gives you a position that you can later use to look up the item again.
    let alice = pool
        .insert("Alice".to_string())
        .expect("the first block always has room");
    let bob = pool
        .insert("Bob".to_string())
        .expect("the first block always has room");

    println!(
        "Pool contains {} items, with a capacity of {} in {} block(s)",
        pool.len(),
        pool.capacity(),
        pool.block_count()
    );

    // References stay valid while the pool grows, so the address of an item never changes.
    let alice_address: *const String = pool.get(alice);

    for index in 0..40 {
        pool.insert(format!("Guest {index}"))
            .expect("we do not expect to run out of memory here");
    }

    println!(
        "After growing: {} items, capacity {} in {} blocks, Alice still at the same address: {}",
        pool.len(),
        pool.capacity(),
        pool.block_count(),
        ptr::eq(alice_address, pool.get(alice))
    );

    pool.get_mut(bob).push_str(" Smith");
    println!("Modified item: {}", pool.get(bob));

    // A mutable cursor can remove items while walking the pool.
    let mut cursor = pool.begin_mut();

    while let Some(name) = cursor.current() {
        if name.starts_with("Guest") {
            cursor.remove_current();
        }

        cursor.move_next();
    }

    println!("Remaining items, first to last:");
    for name in &pool {
        println!("  {name}");
    }

    println!("Remaining items, last to first:");
    for name in pool.iter().rev() {
        println!("  {name}");
    }
}
