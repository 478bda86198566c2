//! Full host wiring of the profiler: producer threads reporting exceptions, one
//! maintenance thread driving the sampling window roll and the periodic tally drain,
//! and detailed-record decisions flowing back to the producers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use exception_profiling::ExceptionProfiler;

fn main() {
    const PRODUCER_COUNT: usize = 4;
    const RUN_TIME: Duration = Duration::from_secs(2);
    const WINDOW_DURATION: Duration = Duration::from_millis(50);
    const DRAIN_PERIOD: Duration = Duration::from_millis(500);
    const TOP_K: usize = 5;

    let profiler = Arc::new(
        ExceptionProfiler::builder()
            .samples_per_window(10)
            .window_duration(WINDOW_DURATION)
            .histogram_capacity(100)
            .build(),
    );

    let running = Arc::new(AtomicBool::new(true));
    let details_emitted = Arc::new(AtomicU64::new(0));
    let events_observed = Arc::new(AtomicU64::new(0));

    // The producers stand in for the exception-interception layer of a real host.
    let producers = (0..PRODUCER_COUNT)
        .map(|producer_index| {
            let profiler = Arc::clone(&profiler);
            let running = Arc::clone(&running);
            let details_emitted = Arc::clone(&details_emitted);
            let events_observed = Arc::clone(&events_observed);

            thread::spawn(move || {
                let mut i = 0_usize;
                while running.load(Ordering::Relaxed) {
                    // A skewed type distribution: mostly timeouts, some parse errors,
                    // the occasional one-off.
                    let type_name = match i % 100 {
                        0..=89 => "app::DbTimeout",
                        90..=98 => "app::ParseError",
                        _ => "app::OneOff",
                    };

                    events_observed.fetch_add(1, Ordering::Relaxed);
                    if profiler.on_event(type_name).emit_detail() {
                        details_emitted.fetch_add(1, Ordering::Relaxed);
                    }

                    i = i.wrapping_add(producer_index + 1);
                    thread::sleep(Duration::from_micros(100));
                }
            })
        })
        .collect::<Vec<_>>();

    // The maintenance thread stands in for the host's repeating timers. The roll runs
    // every window; the drain runs on its own, longer period.
    let maintenance = {
        let profiler = Arc::clone(&profiler);
        let running = Arc::clone(&running);

        thread::spawn(move || {
            let windows_per_drain =
                (DRAIN_PERIOD.as_millis() / WINDOW_DURATION.as_millis()).max(1);
            let mut windows_since_drain = 0_u128;

            while running.load(Ordering::Relaxed) {
                thread::sleep(WINDOW_DURATION);
                profiler.roll();

                windows_since_drain += 1;
                if windows_since_drain >= windows_per_drain {
                    windows_since_drain = 0;

                    let report = profiler.drain(Some(TOP_K));
                    println!(
                        "tally drain (top {TOP_K}, probability {:.4}): {report:?}",
                        profiler.sampler().probability()
                    );
                }
            }
        })
    };

    thread::sleep(RUN_TIME);
    running.store(false, Ordering::Relaxed);

    for producer in producers {
        producer.join().unwrap();
    }
    maintenance.join().unwrap();

    let observed = events_observed.load(Ordering::Relaxed);
    let details = details_emitted.load(Ordering::Relaxed);
    println!("observed {observed} exceptions, emitted {details} detailed records");
}
