//! Producer identity for appended samples.
//!
//! Every thread gets a process-unique id the first time it appends. Ids start
//! at 1 and are never reused within a process.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static PRODUCER_ID: u64 = NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns the id of the calling thread.
#[inline]
pub fn current_producer_id() -> u64 {
    PRODUCER_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_within_thread() {
        assert_eq!(current_producer_id(), current_producer_id());
        assert_ne!(current_producer_id(), 0);
    }

    #[test]
    fn distinct_across_threads() {
        let here = current_producer_id();
        let there = std::thread::spawn(current_producer_id).join().unwrap();
        assert_ne!(here, there);
    }
}
