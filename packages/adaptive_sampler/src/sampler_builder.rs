use std::time::Duration;

use crate::AdaptiveSampler;

/// Default length of one sampling window.
const DEFAULT_WINDOW_DURATION: Duration = Duration::from_millis(500);

/// Default incoming-rate smoothing horizon, in windows.
const DEFAULT_LOOKBACK: u32 = 16;

/// Unless overridden, the budget horizon spans this many times the rate horizon, making
/// budget carryover slower and steadier than rate tracking.
const BUDGET_LOOKBACK_MULTIPLIER: u32 = 16;

/// Creates instances of [`AdaptiveSampler`].
///
/// Required parameters:
/// * `samples_per_window`
///
/// Use `AdaptiveSampler::builder()` to create a new instance of this builder.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use adaptive_sampler::AdaptiveSampler;
///
/// let sampler = AdaptiveSampler::builder()
///     .samples_per_window(50)
///     .window_duration(Duration::from_millis(500))
///     .lookback(16)
///     .build();
/// ```
#[derive(Debug)]
pub struct AdaptiveSamplerBuilder {
    samples_per_window: Option<u64>,
    window_duration: Duration,
    lookback: u32,
    budget_lookback: Option<u32>,
}

impl AdaptiveSamplerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            samples_per_window: None,
            window_duration: DEFAULT_WINDOW_DURATION,
            lookback: DEFAULT_LOOKBACK,
            budget_lookback: None,
        }
    }

    /// Sets the target number of kept events per window. This is a required property.
    ///
    /// Zero is accepted and means "keep nothing once the feedback loop has data" - a
    /// degenerate but valid configuration, since the sampler must never reject its
    /// configuration at runtime.
    #[must_use]
    pub fn samples_per_window(self, samples_per_window: u64) -> Self {
        Self {
            samples_per_window: Some(samples_per_window),
            ..self
        }
    }

    /// Sets the nominal window length the host's timer will drive
    /// [`roll()`][AdaptiveSampler::roll] at.
    ///
    /// The default is 500 ms. The value is advisory - the sampler itself never measures
    /// time - so any value, including zero, is stored as-is.
    #[must_use]
    pub fn window_duration(self, window_duration: Duration) -> Self {
        Self {
            window_duration,
            ..self
        }
    }

    /// Sets the incoming-rate smoothing horizon, in windows.
    ///
    /// The default is 16. Also determines the default budget horizon; see
    /// [`budget_lookback()`][Self::budget_lookback].
    #[must_use]
    pub fn lookback(self, lookback: u32) -> Self {
        Self { lookback, ..self }
    }

    /// Sets the budget-carryover smoothing horizon, in windows.
    ///
    /// The default is 16 times the rate lookback, which makes the sample allowance react
    /// much more slowly than the rate estimate and spreads the repayment of a persistent
    /// shortfall over many windows.
    #[must_use]
    pub fn budget_lookback(self, budget_lookback: u32) -> Self {
        Self {
            budget_lookback: Some(budget_lookback),
            ..self
        }
    }

    /// Builds the sampler with the current configuration.
    ///
    /// # Panics
    ///
    /// Panics if `samples_per_window` is not set.
    ///
    /// Panics if either lookback is zero - a zero smoothing horizon has no meaningful
    /// EMA weight.
    #[must_use]
    pub fn build(self) -> AdaptiveSampler {
        let samples_per_window = self
            .samples_per_window
            .expect("samples_per_window must be set");

        let budget_lookback = self
            .budget_lookback
            .unwrap_or_else(|| self.lookback.saturating_mul(BUDGET_LOOKBACK_MULTIPLIER));

        assert!(self.lookback >= 1, "lookback must be at least one window");
        assert!(
            budget_lookback >= 1,
            "budget lookback must be at least one window"
        );

        AdaptiveSampler::new(
            samples_per_window,
            self.window_duration,
            self.lookback,
            budget_lookback,
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
        drop(AdaptiveSampler::builder().build());
    }

    #[test]
    #[should_panic]
    fn build_with_zero_lookback_panics() {
        drop(
            AdaptiveSampler::builder()
                .samples_per_window(10)
                .lookback(0)
                .build(),
        );
    }

    #[test]
    #[should_panic]
    fn build_with_zero_budget_lookback_panics() {
        drop(
            AdaptiveSampler::builder()
                .samples_per_window(10)
                .budget_lookback(0)
                .build(),
        );
    }

    #[test]
    fn defaults_are_applied() {
        let sampler = AdaptiveSampler::builder().samples_per_window(10).build();

        assert_eq!(sampler.samples_per_window(), 10);
        assert_eq!(sampler.window_duration(), DEFAULT_WINDOW_DURATION);
        assert_eq!(sampler.lookback(), DEFAULT_LOOKBACK);
        assert_eq!(
            sampler.budget_lookback(),
            DEFAULT_LOOKBACK * BUDGET_LOOKBACK_MULTIPLIER
        );
    }

    #[test]
    fn explicit_budget_lookback_overrides_the_multiplier() {
        let sampler = AdaptiveSampler::builder()
            .samples_per_window(10)
            .lookback(8)
            .budget_lookback(8)
            .build();

        assert_eq!(sampler.lookback(), 8);
        assert_eq!(sampler.budget_lookback(), 8);
    }

    #[test]
    fn zero_window_duration_is_stored_as_is() {
        let sampler = AdaptiveSampler::builder()
            .samples_per_window(10)
            .window_duration(Duration::ZERO)
            .build();

        assert_eq!(sampler.window_duration(), Duration::ZERO);
    }
}
