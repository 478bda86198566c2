//! Shows how the feedback loop paces a wildly varying event stream toward a fixed
//! per-window sample budget. Windows are driven manually here; in a real host a repeating
//! timer calls `roll()` instead.

use adaptive_sampler::AdaptiveSampler;

fn main() {
    const TARGET_PER_WINDOW: u64 = 10;

    // A repeating pattern of quiet windows and heavy bursts.
    const EVENTS_PER_WINDOW: &[usize] = &[5, 2000, 0, 150, 150, 2000, 0, 0, 40, 800];

    let sampler = AdaptiveSampler::builder()
        .samples_per_window(TARGET_PER_WINDOW)
        .lookback(4)
        .build();

    println!("target: {TARGET_PER_WINDOW} samples per window");
    println!("window  events  kept  probability");

    for cycle in 0..4 {
        for (index, &events) in EVENTS_PER_WINDOW.iter().enumerate() {
            let probability = sampler.probability();

            let mut kept = 0_u64;
            for _ in 0..events {
                if sampler.sample() {
                    kept += 1;
                }
            }

            let window = cycle * EVENTS_PER_WINDOW.len() + index;
            println!("{window:>6}  {events:>6}  {kept:>4}  {probability:.4}");

            sampler.roll();
        }
    }
}
