use std::sync::atomic::{self, AtomicU64};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;

use crate::{AdaptiveSamplerBuilder, WindowCounts};

/// The maintenance routine publishes the control values with `Release` and producers load
/// them with `Acquire`. This makes a freshly rolled probability/budget pair visible to
/// producers promptly, without requiring it to appear atomically together with the window
/// swap - a producer racing a roll may combine values from adjacent windows for one call,
/// which the feedback math tolerates.
const PUBLISH_ORDERING: atomic::Ordering = atomic::Ordering::Release;
const READ_ORDERING: atomic::Ordering = atomic::Ordering::Acquire;

/// Decides, event by event, whether an event should be kept in detail, holding the number
/// of kept events per window close to a configured target.
///
/// The decision path ([`sample()`][Self::sample]) is lock-free and safe to call from any
/// number of threads. The feedback path ([`roll()`][Self::roll]) must be driven by the
/// host on a repeating timer, once per window; see the
/// [crate-level documentation][crate] for the scheduling contract.
///
/// # How the feedback works
///
/// Each window accumulates a `tested` count and a budget-capped `sampled` count. At every
/// roll the finished window is folded into two exponential moving averages: one tracking
/// the incoming rate, one tracking delivered samples. The next window's sample budget is
/// the smoothed shortfall against the target, stretched over the budget lookback, and the
/// next sampling probability is simply `budget / smoothed rate`, clamped to `[0, 1]`.
///
/// Until the first roll completes, the sampler keeps everything: an uninformed sampler
/// that throttles is worse than one that briefly over-delivers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use adaptive_sampler::AdaptiveSampler;
///
/// let sampler = AdaptiveSampler::builder()
///     .samples_per_window(100)
///     .window_duration(Duration::from_millis(500))
///     .build();
///
/// if sampler.sample() {
///     // Keep this event in detail.
/// }
/// ```
#[derive(Debug)]
pub struct AdaptiveSampler {
    /// The live window, swapped wholesale at each roll. Producers only ever increment
    /// counters on whichever instance they loaded; increments that land on a just-retired
    /// window at the moment of a swap are lost, which is an accepted inaccuracy.
    current: ArcSwap<WindowCounts>,

    /// Bit pattern of the `f64` sampling probability, in `[0, 1]`.
    probability_bits: AtomicU64,

    /// Sample ceiling handed to [`WindowCounts::try_record_sample()`].
    budget: AtomicU64,

    /// State touched only by the maintenance routine. Producers never take this lock; it
    /// exists so that `roll()` can be `&self` (producers share the sampler via `Arc`) and
    /// so that a host that violates the no-overlapping-rolls contract gets serialized
    /// rolls instead of corrupted averages.
    feedback: Mutex<FeedbackState>,

    samples_per_window: u64,
    window_duration: Duration,
    lookback: u32,
    budget_lookback: u32,

    rate_alpha: f64,
    budget_alpha: f64,
}

#[derive(Debug)]
struct FeedbackState {
    /// Smoothed samples delivered per window. `None` until the first roll; the first
    /// observation seeds the average directly, because blending it toward zero would
    /// understate a busy first window for the whole smoothing horizon.
    avg_sampled: Option<f64>,

    /// Smoothed events observed per window. Same seeding rule as `avg_sampled`.
    avg_tested: Option<f64>,
}

impl AdaptiveSampler {
    /// Creates a new sampler builder with the default configuration.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Gets replaced with itself by different name, bad mutation.
    pub fn builder() -> AdaptiveSamplerBuilder {
        AdaptiveSamplerBuilder::new()
    }

    pub(crate) fn new(
        samples_per_window: u64,
        window_duration: Duration,
        lookback: u32,
        budget_lookback: u32,
    ) -> Self {
        // A generous initial allowance: early bursts arriving before the feedback loop has
        // any data to work with are recorded rather than dropped.
        let initial_budget =
            samples_per_window.saturating_mul(u64::from(budget_lookback).saturating_add(1));

        Self {
            current: ArcSwap::from_pointee(WindowCounts::new()),
            probability_bits: AtomicU64::new(1.0_f64.to_bits()),
            budget: AtomicU64::new(initial_budget),
            feedback: Mutex::new(FeedbackState {
                avg_sampled: None,
                avg_tested: None,
            }),
            samples_per_window,
            window_duration,
            lookback,
            budget_lookback,
            rate_alpha: smoothing_alpha(lookback),
            budget_alpha: smoothing_alpha(budget_lookback),
        }
    }

    /// Decides whether the current event should be kept in detail.
    ///
    /// Always counts the event as observed, then keeps it with the current sampling
    /// probability, subject to the current window's remaining sample budget.
    ///
    /// Safe to call concurrently from any thread; never blocks and never allocates.
    #[inline]
    pub fn sample(&self) -> bool {
        let window = self.current.load();
        window.record_test();

        let probability = f64::from_bits(self.probability_bits.load(READ_ORDERING));
        if rand::rng().random::<f64>() >= probability {
            return false;
        }

        let budget = self.budget.load(READ_ORDERING);
        window.try_record_sample(budget)
    }

    /// Closes the current window and publishes the control values for the next one.
    ///
    /// Call this once per [window duration][Self::window_duration], from a single
    /// maintenance thread or timer; calls must not overlap. A late call merely makes one
    /// window longer than nominal, which the smoothing absorbs.
    pub fn roll(&self) {
        // Nothing in this critical section can panic, so a poisoned lock carries no
        // broken invariants and we simply take the state back.
        let mut feedback = self.feedback.lock().unwrap_or_else(PoisonError::into_inner);

        // From here on, new producers land in the fresh window; the retired one has
        // quiesced enough to read (see `WindowCounts` for the in-flight caveat).
        let retired = self.current.swap(Arc::new(WindowCounts::new()));
        let tested = retired.tested();
        let sampled = retired.sampled();

        #[expect(
            clippy::cast_precision_loss,
            reason = "counts are far below 2^52 in any real window; beyond that precision no longer matters"
        )]
        let (tested, sampled) = (tested as f64, sampled as f64);

        #[expect(
            clippy::cast_precision_loss,
            reason = "the target is a small configuration value"
        )]
        let target = self.samples_per_window as f64;

        // Under-delivery against the target becomes next window's allowance, stretched
        // over the budget lookback so a persistent shortfall is repaid gradually.
        let avg_sampled = blend(feedback.avg_sampled, sampled, self.budget_alpha);
        feedback.avg_sampled = Some(avg_sampled);

        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "rounded from a non-negative finite value well below u64::MAX"
        )]
        let budget =
            ((target - avg_sampled).max(0.0) * f64::from(self.budget_lookback)).round() as u64;

        let avg_tested = blend(feedback.avg_tested, tested, self.rate_alpha);
        feedback.avg_tested = Some(avg_tested);

        #[expect(
            clippy::cast_precision_loss,
            reason = "the budget is derived from f64 arithmetic and fits losslessly"
        )]
        let rounded_budget = budget as f64;

        // No observed traffic means there is nothing to throttle.
        let probability = if avg_tested <= 0.0 {
            1.0
        } else {
            (rounded_budget / avg_tested).min(1.0)
        };

        self.budget.store(budget, PUBLISH_ORDERING);
        self.probability_bits
            .store(probability.to_bits(), PUBLISH_ORDERING);
    }

    /// The probability with which the next events will be kept, in `[0, 1]`.
    #[must_use]
    pub fn probability(&self) -> f64 {
        f64::from_bits(self.probability_bits.load(READ_ORDERING))
    }

    /// The sample allowance of the current window.
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget.load(READ_ORDERING)
    }

    /// The configured target number of kept events per window.
    #[must_use]
    pub fn samples_per_window(&self) -> u64 {
        self.samples_per_window
    }

    /// The nominal window length the host's timer is expected to drive
    /// [`roll()`][Self::roll] at.
    #[must_use]
    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    /// The incoming-rate smoothing horizon, in windows.
    #[must_use]
    pub fn lookback(&self) -> u32 {
        self.lookback
    }

    /// The budget-carryover smoothing horizon, in windows.
    #[must_use]
    pub fn budget_lookback(&self) -> u32 {
        self.budget_lookback
    }
}

/// Folds one observation into an exponential moving average.
///
/// The first observation seeds the average directly instead of blending from zero.
fn blend(average: Option<f64>, observation: f64, alpha: f64) -> f64 {
    match average {
        None => observation,
        Some(average) => alpha.mul_add(observation - average, average),
    }
}

/// The EMA weight for a lookback of `L` windows: `1 - L^(-1/L)`.
///
/// Chosen so that `(1 - alpha)^L ~= 1/L`, i.e. an observation from `L` windows ago still
/// carries roughly the importance it would have in a plain arithmetic mean of `L` values.
fn smoothing_alpha(lookback: u32) -> f64 {
    let lookback = f64::from(lookback);
    1.0 - lookback.powf(-1.0 / lookback)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn shared_across_threads() {
        assert_impl_all!(AdaptiveSampler: Send, Sync);
    }

    #[test]
    fn cold_start_samples_everything() {
        let sampler = AdaptiveSampler::builder().samples_per_window(10).build();

        assert!((sampler.probability() - 1.0).abs() < f64::EPSILON);

        for _ in 0..500 {
            assert!(sampler.sample());
        }
    }

    #[test]
    fn initial_budget_covers_the_whole_lookback() {
        let sampler = AdaptiveSampler::builder()
            .samples_per_window(10)
            .lookback(1)
            .budget_lookback(4)
            .build();

        assert_eq!(sampler.budget(), 10 * (1 + 4));
    }

    #[test]
    fn heavy_window_throttles_the_next_one() {
        let sampler = AdaptiveSampler::builder()
            .samples_per_window(10)
            .lookback(16)
            .build();

        // Ten times the target arrives in the first window and is fully kept.
        for _ in 0..100 {
            assert!(sampler.sample());
        }

        sampler.roll();

        // The shortfall-based budget is zero (we over-delivered), which pins the
        // probability to zero as well.
        assert_eq!(sampler.budget(), 0);
        assert!(sampler.probability().abs() < f64::EPSILON);
        assert!(!sampler.sample());
    }

    #[test]
    fn idle_windows_do_not_throttle() {
        let sampler = AdaptiveSampler::builder().samples_per_window(10).build();

        for _ in 0..5 {
            sampler.roll();
        }

        // No traffic at all: probability stays at 1 and the next event is kept.
        assert!((sampler.probability() - 1.0).abs() < f64::EPSILON);
        assert!(sampler.sample());
    }

    #[test]
    fn light_traffic_is_never_throttled() {
        let sampler = AdaptiveSampler::builder().samples_per_window(10).build();

        // Half the target per window, sustained.
        for _ in 0..6 {
            for _ in 0..5 {
                assert!(sampler.sample());
            }
            sampler.roll();
        }

        assert!((sampler.probability() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_target_degenerates_to_sampling_nothing() {
        let sampler = AdaptiveSampler::builder().samples_per_window(0).build();

        for _ in 0..50 {
            sampler.sample();
        }
        sampler.roll();

        assert!(sampler.probability().abs() < f64::EPSILON);
        assert_eq!(sampler.budget(), 0);
        assert!(!sampler.sample());
    }

    #[test]
    fn smoothing_alpha_matches_the_lookback_derivation() {
        // (1 - alpha)^L == 1/L by construction.
        for lookback in [2_u32, 4, 16, 64, 256] {
            let alpha = smoothing_alpha(lookback);
            let decayed = (1.0 - alpha).powi(i32::try_from(lookback).unwrap());

            assert!((decayed - 1.0 / f64::from(lookback)).abs() < 1e-9);
        }
    }

    #[test]
    fn blend_seeds_directly_then_smooths() {
        let seeded = blend(None, 100.0, 0.25);
        assert!((seeded - 100.0).abs() < f64::EPSILON);

        let smoothed = blend(Some(seeded), 0.0, 0.25);
        assert!((smoothed - 75.0).abs() < f64::EPSILON);
    }
}
