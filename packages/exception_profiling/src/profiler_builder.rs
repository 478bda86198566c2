use std::time::Duration;

use adaptive_sampler::AdaptiveSampler;

use crate::{ExceptionHistogram, ExceptionProfiler};

/// Default maximum number of resident exception types in the tally.
const DEFAULT_HISTOGRAM_CAPACITY: usize = 100;

/// Creates instances of [`ExceptionProfiler`].
///
/// Required parameters:
/// * `samples_per_window`
///
/// Use `ExceptionProfiler::builder()` to create a new instance of this builder.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use exception_profiling::ExceptionProfiler;
///
/// let profiler = ExceptionProfiler::builder()
///     .samples_per_window(10)
///     .window_duration(Duration::from_millis(500))
///     .histogram_capacity(100)
///     .build();
/// ```
#[derive(Debug)]
pub struct ExceptionProfilerBuilder {
    samples_per_window: Option<u64>,
    window_duration: Option<Duration>,
    lookback: Option<u32>,
    budget_lookback: Option<u32>,
    histogram_capacity: usize,
}

impl ExceptionProfilerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            samples_per_window: None,
            window_duration: None,
            lookback: None,
            budget_lookback: None,
            histogram_capacity: DEFAULT_HISTOGRAM_CAPACITY,
        }
    }

    /// Sets the target number of detailed records per sampling window. This is a
    /// required property.
    ///
    /// Zero is accepted; see
    /// [`AdaptiveSamplerBuilder::samples_per_window()`][adaptive_sampler::AdaptiveSamplerBuilder::samples_per_window].
    #[must_use]
    pub fn samples_per_window(self, samples_per_window: u64) -> Self {
        Self {
            samples_per_window: Some(samples_per_window),
            ..self
        }
    }

    /// Sets the sampling window length the host's timer will drive
    /// [`roll()`][ExceptionProfiler::roll] at. Defaults to the sampler's default of
    /// 500 ms.
    #[must_use]
    pub fn window_duration(self, window_duration: Duration) -> Self {
        Self {
            window_duration: Some(window_duration),
            ..self
        }
    }

    /// Sets the sampler's incoming-rate smoothing horizon, in windows.
    #[must_use]
    pub fn lookback(self, lookback: u32) -> Self {
        Self {
            lookback: Some(lookback),
            ..self
        }
    }

    /// Sets the sampler's budget-carryover smoothing horizon, in windows.
    #[must_use]
    pub fn budget_lookback(self, budget_lookback: u32) -> Self {
        Self {
            budget_lookback: Some(budget_lookback),
            ..self
        }
    }

    /// Sets the maximum number of resident exception types in the tally. The default
    /// is 100; zero folds every type into the overflow bucket.
    #[must_use]
    pub fn histogram_capacity(self, histogram_capacity: usize) -> Self {
        Self {
            histogram_capacity,
            ..self
        }
    }

    /// Builds the profiler with the current configuration.
    ///
    /// # Panics
    ///
    /// Panics if `samples_per_window` is not set, or if a zero lookback is configured;
    /// see [`AdaptiveSamplerBuilder::build()`][adaptive_sampler::AdaptiveSamplerBuilder::build].
    #[must_use]
    pub fn build(self) -> ExceptionProfiler {
        let mut sampler = AdaptiveSampler::builder().samples_per_window(
            self.samples_per_window
                .expect("samples_per_window must be set"),
        );

        if let Some(window_duration) = self.window_duration {
            sampler = sampler.window_duration(window_duration);
        }
        if let Some(lookback) = self.lookback {
            sampler = sampler.lookback(lookback);
        }
        if let Some(budget_lookback) = self.budget_lookback {
            sampler = sampler.budget_lookback(budget_lookback);
        }

        ExceptionProfiler::new(
            sampler.build(),
            ExceptionHistogram::new(self.histogram_capacity),
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn build_without_target_panics() {
        drop(ExceptionProfiler::builder().build());
    }

    #[test]
    fn defaults_are_applied() {
        let profiler = ExceptionProfiler::builder().samples_per_window(10).build();

        assert_eq!(profiler.sampler().samples_per_window(), 10);
        assert_eq!(
            profiler.histogram().capacity(),
            DEFAULT_HISTOGRAM_CAPACITY
        );
    }

    #[test]
    fn settings_are_forwarded_to_the_components() {
        let profiler = ExceptionProfiler::builder()
            .samples_per_window(25)
            .window_duration(Duration::from_secs(1))
            .lookback(8)
            .budget_lookback(32)
            .histogram_capacity(7)
            .build();

        assert_eq!(profiler.sampler().samples_per_window(), 25);
        assert_eq!(profiler.sampler().window_duration(), Duration::from_secs(1));
        assert_eq!(profiler.sampler().lookback(), 8);
        assert_eq!(profiler.sampler().budget_lookback(), 32);
        assert_eq!(profiler.histogram().capacity(), 7);
    }
}
