use std::sync::atomic::{self, AtomicU64};

/// We use `Relaxed` ordering for the window counters because producers are unordered with
/// respect to each other by contract and the maintenance routine only reads a window after
/// swapping it out of the producers' reach. Increments still in flight at the instant of
/// the swap may be missed; that slight under-count is an accepted property of the design.
const COUNTER_ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// Raw observation counts for a single sampling window.
///
/// `tested` counts every event the sampler looked at; `sampled` counts the subset it kept,
/// and stops advancing once it reaches the ceiling supplied by the caller. One instance is
/// live at a time, shared by all producer threads; the maintenance routine retires it at
/// each window roll and reads its final values.
#[derive(Debug)]
pub(crate) struct WindowCounts {
    tested: AtomicU64,
    sampled: AtomicU64,
}

impl WindowCounts {
    pub(crate) fn new() -> Self {
        Self {
            tested: AtomicU64::new(0),
            sampled: AtomicU64::new(0),
        }
    }

    /// Counts one observed event, kept or not.
    #[inline]
    pub(crate) fn record_test(&self) {
        self.tested.fetch_add(1, COUNTER_ORDERING);
    }

    /// Counts one kept event, unless the window has already used up `ceiling` samples.
    ///
    /// Returns whether the sample was counted. The compare-and-swap loop retries only
    /// while other threads are claiming samples below the ceiling, so it terminates in
    /// O(1) expected iterations.
    #[inline]
    pub(crate) fn try_record_sample(&self, ceiling: u64) -> bool {
        let mut sampled = self.sampled.load(COUNTER_ORDERING);

        while sampled < ceiling {
            // Guarded by `sampled < ceiling`, so the increment cannot overflow.
            match self.sampled.compare_exchange_weak(
                sampled,
                sampled.wrapping_add(1),
                COUNTER_ORDERING,
                COUNTER_ORDERING,
            ) {
                Ok(_) => return true,
                Err(current) => sampled = current,
            }
        }

        false
    }

    pub(crate) fn tested(&self) -> u64 {
        self.tested.load(COUNTER_ORDERING)
    }

    pub(crate) fn sampled(&self) -> u64 {
        self.sampled.load(COUNTER_ORDERING)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn counts_start_at_zero() {
        let counts = WindowCounts::new();

        assert_eq!(counts.tested(), 0);
        assert_eq!(counts.sampled(), 0);
    }

    #[test]
    fn sampled_never_exceeds_tested() {
        let counts = WindowCounts::new();

        for _ in 0..100 {
            counts.record_test();
            counts.try_record_sample(u64::MAX);

            assert!(counts.sampled() <= counts.tested());
        }

        assert_eq!(counts.tested(), 100);
        assert_eq!(counts.sampled(), 100);
    }

    #[test]
    fn sampled_saturates_at_ceiling() {
        let counts = WindowCounts::new();

        for i in 0..10 {
            counts.record_test();
            assert_eq!(counts.try_record_sample(4), i < 4);
        }

        assert_eq!(counts.tested(), 10);
        assert_eq!(counts.sampled(), 4);
    }

    #[test]
    fn zero_ceiling_rejects_every_sample() {
        let counts = WindowCounts::new();

        counts.record_test();

        assert!(!counts.try_record_sample(0));
        assert_eq!(counts.sampled(), 0);
    }

    #[test]
    fn concurrent_sampling_stops_exactly_at_ceiling() {
        const THREAD_COUNT: usize = 8;
        const ATTEMPTS_PER_THREAD: usize = 10_000;
        const CEILING: u64 = 1000;

        let counts = Arc::new(WindowCounts::new());

        let threads = (0..THREAD_COUNT)
            .map(|_| {
                let counts = Arc::clone(&counts);
                thread::spawn(move || {
                    let mut accepted = 0_u64;
                    for _ in 0..ATTEMPTS_PER_THREAD {
                        counts.record_test();
                        if counts.try_record_sample(CEILING) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect::<Vec<_>>();

        let accepted_total: u64 = threads.into_iter().map(|t| t.join().unwrap()).sum();

        // Every accepted attempt is accounted for and the ceiling was hit exactly.
        assert_eq!(accepted_total, CEILING);
        assert_eq!(counts.sampled(), CEILING);
        assert_eq!(counts.tested(), (THREAD_COUNT * ATTEMPTS_PER_THREAD) as u64);
    }
}
