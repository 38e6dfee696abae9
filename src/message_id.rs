//! Message id allocation for a single channel.
//!
//! SMB2 message ids advance by each request's credit charge, so a request
//! charged `n` credits owns the `n` ids starting at the one it is assigned.
//! Allocation is one atomic fetch-and-add: concurrent callers can never be
//! handed the same id, and ids come out in allocation order.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

/// Monotonic message id counter.
///
/// The counter is assumed never to reach `2^64`; a channel would need to
/// send for centuries at line rate to get there.
#[derive(Debug)]
pub struct MessageIdAllocator {
    next: AtomicU64,
}

impl Default for MessageIdAllocator {
    fn default() -> Self { Self::new() }
}

impl MessageIdAllocator {
    /// Create an allocator whose first id is zero, as Negotiate requires.
    #[must_use]
    pub fn new() -> Self { Self::starting_at(0) }

    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Reserve ids for a request charged `credit_charge` credits.
    ///
    /// Returns the first reserved id. A zero charge (Negotiate) still
    /// advances the counter by one.
    ///
    /// # Concurrency
    ///
    /// `Relaxed` ordering is enough: only the uniqueness and monotonicity of
    /// the returned values matter, and `fetch_add` guarantees both under any
    /// ordering.
    ///
    /// # Examples
    ///
    /// ```
    /// use smb2_flow::message_id::MessageIdAllocator;
    ///
    /// let ids = MessageIdAllocator::new();
    /// assert_eq!(ids.allocate(0), 0);
    /// assert_eq!(ids.allocate(4), 1);
    /// assert_eq!(ids.allocate(1), 5);
    /// assert_eq!(ids.peek(), 6);
    /// ```
    pub fn allocate(&self, credit_charge: u16) -> u64 {
        self.next
            .fetch_add(u64::from(credit_charge.max(1)), Ordering::Relaxed)
    }

    /// Return the id the next allocation would start at.
    #[must_use]
    pub fn peek(&self) -> u64 { self.next.load(Ordering::Relaxed) }

    /// Rewind to zero for a freshly negotiated transport.
    pub fn reset(&self) { self.next.store(0, Ordering::Relaxed); }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::{sync::Arc, thread};

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[1, 1, 1], &[0, 1, 2])]
    #[case(&[0, 3, 2, 1], &[0, 1, 4, 6])]
    #[case(&[8, 0], &[0, 8])]
    fn ids_advance_by_charge(#[case] charges: &[u16], #[case] expected: &[u64]) {
        let ids = MessageIdAllocator::new();
        let assigned: Vec<u64> = charges.iter().map(|&c| ids.allocate(c)).collect();
        assert_eq!(assigned, expected);
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let ids = Arc::new(MessageIdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.allocate(2)).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("allocator thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 500);
        assert_eq!(ids.peek(), 8 * 500 * 2);
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let ids = MessageIdAllocator::starting_at(99);
        assert_eq!(ids.allocate(1), 99);
        ids.reset();
        assert_eq!(ids.allocate(1), 0);
    }
}
