use adaptive_sampler::AdaptiveSampler;

use crate::{ExceptionHistogram, ExceptionProfilerBuilder};

/// The verdict for one observed exception.
///
/// Produced by [`ExceptionProfiler::on_event()`]. The tally update has already happened
/// by the time the caller sees this; the verdict only says whether a detailed record is
/// additionally warranted, and why.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decision {
    emit_detail: bool,
    sampled: bool,
    first_hit: bool,
}

impl Decision {
    /// Whether the caller should emit a detailed record for this event.
    #[must_use]
    pub fn emit_detail(&self) -> bool {
        self.emit_detail
    }

    /// Whether the rate sampler picked this event.
    #[must_use]
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Whether this was the first occurrence of the event's type in the current
    /// tally period.
    #[must_use]
    pub fn first_hit(&self) -> bool {
        self.first_hit
    }
}

/// Per-event decision engine for a stream of observed exceptions.
///
/// Every event is tallied by type in a bounded [`ExceptionHistogram`]; a detailed record
/// is warranted when the [`AdaptiveSampler`] picks the event *or* when it is the first
/// occurrence of its type in the current tally period. The latter guarantees that rare or
/// newly appearing failure types stay visible even while a high-volume unrelated stream
/// has driven the sampling probability toward zero.
///
/// One explicitly owned instance per process is the intended production shape - inject it
/// into the exception-interception layer rather than reaching for a global, so tests can
/// hold as many independent instances as they like.
///
/// # Scheduling contract
///
/// The host owns two repeating timers: one calls [`roll()`][Self::roll] every
/// [window duration][AdaptiveSampler::window_duration], the other calls
/// [`drain()`][Self::drain] on the (typically much longer) reporting period and forwards
/// the result to wherever reports go. Neither call may overlap with itself.
///
/// # Example
///
/// ```
/// use exception_profiling::ExceptionProfiler;
///
/// let profiler = ExceptionProfiler::builder()
///     .samples_per_window(10)
///     .histogram_capacity(100)
///     .build();
///
/// let decision = profiler.on_event("std::io::Error");
/// assert!(decision.first_hit());
/// assert!(decision.emit_detail());
///
/// // Periodically, on the host's timers:
/// profiler.roll();
/// let report = profiler.drain(Some(50));
/// assert_eq!(report, vec![("std::io::Error".to_string(), 1)]);
/// ```
#[derive(Debug)]
pub struct ExceptionProfiler {
    sampler: AdaptiveSampler,
    histogram: ExceptionHistogram,
}

impl ExceptionProfiler {
    /// Creates a new profiler builder with the default configuration.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Gets replaced with itself by different name, bad mutation.
    pub fn builder() -> ExceptionProfilerBuilder {
        ExceptionProfilerBuilder::new()
    }

    pub(crate) fn new(sampler: AdaptiveSampler, histogram: ExceptionHistogram) -> Self {
        Self { sampler, histogram }
    }

    /// Processes one observed exception of the given fully qualified type name.
    ///
    /// Tallies the occurrence unconditionally, then consults the sampler - also
    /// unconditionally, so the sampler's rate statistics see every event, including the
    /// ones a first hit already forces out in detail.
    ///
    /// Safe to call concurrently from any thread.
    #[inline]
    pub fn on_event(&self, type_name: &str) -> Decision {
        let first_hit = self.histogram.record(type_name);
        let sampled = self.sampler.sample();

        Decision {
            emit_detail: first_hit || sampled,
            sampled,
            first_hit,
        }
    }

    /// Closes the sampler's current window. Host timer entry point; see the type-level
    /// documentation.
    pub fn roll(&self) {
        self.sampler.roll();
    }

    /// Reports and resets the tally. Host timer entry point; see the type-level
    /// documentation and [`ExceptionHistogram::drain()`].
    pub fn drain(&self, top_k: Option<usize>) -> Vec<(String, u64)> {
        self.histogram.drain(top_k)
    }

    /// The rate sampler, for hosts that wire the maintenance callbacks directly or want
    /// to inspect the control values.
    #[must_use]
    pub fn sampler(&self) -> &AdaptiveSampler {
        &self.sampler
    }

    /// The per-type tally, for hosts that wire the maintenance callbacks directly or
    /// toggle recording.
    #[must_use]
    pub fn histogram(&self) -> &ExceptionHistogram {
        &self.histogram
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn shared_across_threads() {
        assert_impl_all!(ExceptionProfiler: Send, Sync);
        assert_impl_all!(Decision: Send, Sync);
    }

    #[test]
    fn first_occurrence_forces_a_detailed_record() {
        let profiler = ExceptionProfiler::builder().samples_per_window(10).build();

        // Saturate the sampler so its probability pins to zero...
        for _ in 0..1000 {
            profiler.on_event("NoisyException");
        }
        profiler.roll();
        assert!(profiler.sampler().probability().abs() < f64::EPSILON);

        // ...yet a never-seen type still gets a detailed record.
        let decision = profiler.on_event("RareException");

        assert!(decision.first_hit());
        assert!(!decision.sampled());
        assert!(decision.emit_detail());
    }

    #[test]
    fn repeat_occurrences_follow_the_sampler() {
        let profiler = ExceptionProfiler::builder().samples_per_window(10).build();

        let first = profiler.on_event("SomeException");
        assert!(first.first_hit());

        // Cold-start sampler keeps everything, so repeats are emitted as samples.
        let repeat = profiler.on_event("SomeException");
        assert!(!repeat.first_hit());
        assert!(repeat.sampled());
        assert!(repeat.emit_detail());
    }

    #[test]
    fn throttled_repeats_are_tally_only() {
        let profiler = ExceptionProfiler::builder().samples_per_window(10).build();

        for _ in 0..1000 {
            profiler.on_event("NoisyException");
        }
        profiler.roll();
        profiler.drain(None);

        // Sampler pinned to zero and the type already tallied this period: nothing to emit.
        profiler.on_event("NoisyException");
        let decision = profiler.on_event("NoisyException");

        assert!(!decision.first_hit());
        assert!(!decision.sampled());
        assert!(!decision.emit_detail());
    }

    #[test]
    fn every_event_reaches_the_tally_regardless_of_sampling() {
        let profiler = ExceptionProfiler::builder().samples_per_window(0).build();

        for _ in 0..7 {
            profiler.on_event("AlwaysTallied");
        }
        profiler.roll();

        assert_eq!(
            profiler.drain(None),
            vec![("AlwaysTallied".to_string(), 7)]
        );
    }
}
