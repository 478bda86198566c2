#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Budgeted detail sampling and bounded per-type tallying for high-volume exception
//! streams.
//!
//! An instrumented process can throw exceptions at wildly varying rates, and recording
//! every one in detail would bury the host in overhead precisely when things go wrong.
//! This crate decides, per observed exception, between three outcomes:
//!
//! * **record in detail** - the event is either the first of its type this period or was
//!   picked by the rate sampler;
//! * **tally only** - the event only bumps its type's occurrence count;
//! * and implicitly, for the per-type counts themselves: **report periodically**, bounded
//!   to a fixed number of distinct types with an overflow bucket absorbing the rest.
//!
//! Detail volume is governed by [`adaptive_sampler`], which holds detailed records close
//! to a fixed budget per time window regardless of the incoming rate. The first-hit
//! guarantee rides on top: a newly appearing exception type always produces one detailed
//! record, no matter how hard an unrelated noisy type has pushed the sampling probability
//! down.
//!
//! # Example
//!
//! ```
//! use exception_profiling::ExceptionProfiler;
//!
//! let profiler = ExceptionProfiler::builder()
//!     .samples_per_window(10)
//!     .histogram_capacity(100)
//!     .build();
//!
//! // Called by the exception-interception layer, once per thrown exception.
//! let decision = profiler.on_event("java.lang.NullPointerException");
//!
//! if decision.emit_detail() {
//!     // Hand the event to the record emission pipeline.
//! }
//! ```
//!
//! # Scheduling contract
//!
//! Nothing in this crate starts threads, timers or I/O. The host owns two repeating
//! timers: a short one (the sampling window, 500 ms by default) calling
//! [`ExceptionProfiler::roll()`], and a longer reporting one calling
//! [`ExceptionProfiler::drain()`] and forwarding the returned per-type counts to the
//! record emission pipeline. See `examples/profiling_pipeline.rs` for the full wiring.
//!
//! # Thread safety
//!
//! [`ExceptionProfiler::on_event()`] is safe to call from any number of threads
//! concurrently and never blocks: producers touch only lock-free counters and a
//! concurrent map. The two maintenance entry points must each be driven sequentially.

mod histogram;
mod profiler;
mod profiler_builder;

pub use histogram::*;
pub use profiler::*;
pub use profiler_builder::*;
