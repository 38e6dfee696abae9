#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for message id allocation using loom.
//!
//! `loom` explores every interleaving of the concurrent `fetch_add` calls to
//! show that no two requests are ever handed overlapping id ranges.

use loom::{model, sync::Arc, thread};
use smb2_flow::message_id::MessageIdAllocator;

#[test]
fn concurrent_allocations_never_overlap() {
    model(|| {
        let ids = Arc::new(MessageIdAllocator::new());
        let first = Arc::clone(&ids);
        let second = Arc::clone(&ids);

        let t1 = thread::spawn(move || first.allocate(2));
        let t2 = thread::spawn(move || second.allocate(1));

        let a = t1.join().expect("first allocator thread panicked");
        let b = t2.join().expect("second allocator thread panicked");

        let mut ranges = [(a, a + 2), (b, b + 1)];
        ranges.sort_unstable();
        assert!(ranges[0].1 <= ranges[1].0, "ranges overlap: {ranges:?}");
        assert_eq!(ids.peek(), 3);
    });
}

#[test]
fn reset_races_with_allocation() {
    model(|| {
        let ids = Arc::new(MessageIdAllocator::starting_at(10));
        let allocator = Arc::clone(&ids);

        let t1 = thread::spawn(move || allocator.allocate(1));
        ids.reset();
        let id = t1.join().expect("allocator thread panicked");

        // The allocation lands entirely before or after the reset.
        match id {
            10 => assert_eq!(ids.peek(), 0),
            0 => assert_eq!(ids.peek(), 1),
            other => panic!("unexpected id {other}"),
        }
    });
}
