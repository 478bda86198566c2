#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Self-tuning streaming sampler for high-volume event streams.
//!
//! Given a continuous stream of events arriving on arbitrary threads, [`AdaptiveSampler`]
//! answers one question per event - "is this one worth keeping in detail?" - while holding
//! the number of kept events per time window close to a configured target, even when the
//! incoming rate swings by orders of magnitude between windows.
//!
//! The sampler remembers nothing per event. It accumulates two counters per window and
//! folds each completed window into a pair of exponential moving averages, from which it
//! derives the sampling probability and the sample allowance for the next window. Windows
//! that deliver fewer samples than the target grow the allowance of the windows that
//! follow, so a persistent shortfall is repaid over the smoothing horizon rather than in
//! one burst.
//!
//! # Example
//!
//! ```
//! use adaptive_sampler::AdaptiveSampler;
//!
//! let sampler = AdaptiveSampler::builder()
//!     .samples_per_window(10)
//!     .build();
//!
//! let mut kept = 0;
//! for _ in 0..1000 {
//!     if sampler.sample() {
//!         kept += 1;
//!     }
//! }
//!
//! // No window has been rolled yet, so the sampler is still in its
//! // sample-everything cold-start state.
//! assert_eq!(kept, 1000);
//!
//! // The host's timer drives window maintenance.
//! sampler.roll();
//! ```
//!
//! # Scheduling contract
//!
//! The sampler never starts threads or timers. The host owns a repeating timer and calls
//! [`AdaptiveSampler::roll()`] once per [window duration][AdaptiveSamplerBuilder::window_duration].
//! Rolls must not overlap; timer jitter is fine - a late roll just makes one window longer,
//! which the smoothing math absorbs.
//!
//! # Thread safety
//!
//! [`AdaptiveSampler::sample()`] may be called concurrently from any number of threads. It
//! never blocks, never allocates and performs a small bounded number of atomic operations.
//! Producers never wait on each other or on the maintenance routine.
//!
//! # Degenerate configurations
//!
//! There are no rejected configurations and no failure modes, because the host process
//! must keep running no matter what it was configured with:
//!
//! * a target of zero samples per window pins the sampling probability to zero after the
//!   first roll (events are still counted as tested);
//! * a zero window duration is advisory metadata for the host's timer and is stored as-is.

mod sampler;
mod sampler_builder;
mod window;

pub use sampler::*;
pub use sampler_builder::*;
pub(crate) use window::*;
