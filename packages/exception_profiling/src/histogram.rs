use std::fmt;
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicUsize};

use scc::HashMap;

/// Name under which the overflow bucket appears in [`ExceptionHistogram::drain()`] output.
pub const OVERFLOW_TYPE_NAME: &str = "<overflow>";

/// We use `Relaxed` ordering throughout: the counters carry no ordering obligations toward
/// each other, and the map itself provides the synchronization between recording and
/// draining an entry.
const COUNTER_ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// A concurrent tally of event occurrences by type name, bounded in cardinality.
///
/// At most `capacity` distinct type names are resident at a time; every occurrence of a
/// type that arrives while the map is full is folded into a single reserved overflow
/// bucket, indistinguishably from every other overflowing type. This is a deliberate
/// approximation: cardinality stays bounded no matter how pathological the stream is.
///
/// Recording is lock-free from the caller's perspective and returns a "first occurrence
/// since the last drain" signal, which callers use to guarantee that a newly seen type is
/// always worth a detailed record. Periodic [`drain()`][Self::drain] calls - from a single
/// maintenance actor - report and reset the tally, and evict entries that have gone quiet
/// so their slots can be reused by new types.
///
/// # Example
///
/// ```
/// use exception_profiling::ExceptionHistogram;
///
/// let histogram = ExceptionHistogram::new(100);
///
/// assert!(histogram.record("std::io::Error"));
/// assert!(!histogram.record("std::io::Error"));
///
/// let report = histogram.drain(None);
/// assert_eq!(report, vec![("std::io::Error".to_string(), 2)]);
/// ```
pub struct ExceptionHistogram {
    /// Resident per-type counters. Never grows past `capacity`; residency is controlled
    /// by the `resident` slot counter below, not by the map itself.
    entries: HashMap<String, AtomicU64>,

    /// Number of occupied (or reserved, mid-insert) residency slots. Insertion reserves a
    /// slot with a compare-and-swap before touching the map, so the capacity bound holds
    /// even when many threads race to insert distinct new types.
    resident: AtomicUsize,

    /// Occurrences of every type that arrived while the map was full. Kept outside the
    /// map so that overflow accounting can never be evicted or compete for a slot.
    overflow: AtomicU64,

    capacity: usize,

    /// While disabled, recording counts nothing and reports no first hits. Hosts flip
    /// this when the downstream recording session is not running.
    enabled: AtomicBool,
}

impl ExceptionHistogram {
    /// Creates a histogram that keeps at most `capacity` distinct type names resident.
    ///
    /// A capacity of zero is valid: every occurrence then lands in the overflow bucket.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            resident: AtomicUsize::new(0),
            overflow: AtomicU64::new(0),
            capacity,
            enabled: AtomicBool::new(true),
        }
    }

    /// Counts one occurrence of `type_name`.
    ///
    /// Returns whether this was the first occurrence of the type since it was last
    /// drained away (or ever). If the map is at capacity and the type is not resident,
    /// the occurrence is folded into the overflow bucket; only the first contributor to
    /// the overflow bucket per drain period reports a first hit, even though later
    /// contributors may be first occurrences of their own types - an accepted
    /// approximation of the folding.
    ///
    /// Returns `false` without counting anything while the histogram is disabled.
    #[inline]
    pub fn record(&self, type_name: &str) -> bool {
        if !self.enabled.load(COUNTER_ORDERING) {
            return false;
        }

        loop {
            if let Some(previous) = self
                .entries
                .read(type_name, |_, count| count.fetch_add(1, COUNTER_ORDERING))
            {
                return previous == 0;
            }

            // Not resident. Claim a residency slot, or fold into the overflow bucket if
            // the map is full.
            if !self.try_reserve_slot() {
                return self.overflow.fetch_add(1, COUNTER_ORDERING) == 0;
            }

            match self.entries.insert(type_name.to_owned(), AtomicU64::new(1)) {
                Ok(()) => return true,
                // Another thread inserted the same type first; give the slot back and
                // take the resident path.
                Err(_) => self.release_slot(),
            }
        }
    }

    /// Reports and resets the tally.
    ///
    /// Returns the non-zero `(type name, occurrences)` pairs in descending occurrence
    /// order (ties in unspecified order), truncated to `top_k` entries when given a
    /// positive limit. A non-empty overflow bucket is reported last under
    /// [`OVERFLOW_TYPE_NAME`], exempt from the truncation.
    ///
    /// Entries whose count is still zero afterwards are evicted and their slots freed;
    /// a type that keeps recurring stays resident with whatever count it accumulated
    /// between the snapshot and the eviction sweep, avoiding recreation churn.
    ///
    /// Intended to be called periodically by a single maintenance actor; concurrent
    /// `record()` calls are safe throughout.
    pub fn drain(&self, top_k: Option<usize>) -> Vec<(String, u64)> {
        let mut drained = Vec::new();

        self.entries.scan(|type_name, count| {
            let occurrences = count.swap(0, COUNTER_ORDERING);
            if occurrences != 0 {
                drained.push((type_name.clone(), occurrences));
            }
        });

        drained.sort_unstable_by(|left, right| right.1.cmp(&left.1));

        if let Some(limit) = top_k.filter(|&limit| limit > 0) {
            drained.truncate(limit);
        }

        let overflowed = self.overflow.swap(0, COUNTER_ORDERING);
        if overflowed != 0 {
            drained.push((OVERFLOW_TYPE_NAME.to_owned(), overflowed));
        }

        let mut evicted = 0_usize;
        self.entries.retain(|_, count| {
            if count.load(COUNTER_ORDERING) == 0 {
                // Bounded by the number of resident entries, so the increment cannot overflow.
                evicted = evicted.wrapping_add(1);
                false
            } else {
                true
            }
        });
        if evicted > 0 {
            self.resident.fetch_sub(evicted, COUNTER_ORDERING);
        }

        drained
    }

    /// Turns recording on or off. While off, [`record()`][Self::record] is a no-op.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, COUNTER_ORDERING);
    }

    /// Whether recording is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(COUNTER_ORDERING)
    }

    /// Number of type names currently holding a residency slot.
    #[must_use]
    pub fn resident_types(&self) -> usize {
        self.resident.load(COUNTER_ORDERING)
    }

    /// Maximum number of resident type names.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_reserve_slot(&self) -> bool {
        let mut resident = self.resident.load(COUNTER_ORDERING);

        while resident < self.capacity {
            // Guarded by `resident < capacity`, so the increment cannot overflow.
            match self.resident.compare_exchange_weak(
                resident,
                resident.wrapping_add(1),
                COUNTER_ORDERING,
                COUNTER_ORDERING,
            ) {
                Ok(_) => return true,
                Err(current) => resident = current,
            }
        }

        false
    }

    fn release_slot(&self) {
        self.resident.fetch_sub(1, COUNTER_ORDERING);
    }
}

impl fmt::Debug for ExceptionHistogram {
    #[cfg_attr(test, mutants::skip)] // Purely cosmetic output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHistogram")
            .field("capacity", &self.capacity)
            .field("resident", &self.resident)
            .field("overflow", &self.overflow)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
