//! Host-side run of the sampling pipeline.
//!
//! A producer thread plays the ADC interrupt and feeds the real
//! [`SampleRing`] through an [`AnalogSampler`]; the calling thread plays the
//! main loop with a [`SampleConsumer`]. Useful for seeing how many samples a
//! given main-loop period loses to a full ring.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, info};

use forcegauge_core::{AnalogSampler, SampleConsumer, SampleRing, SampleSink, ADC_BUFSIZE};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Conversions the fake ADC produces.
    pub samples: u16,
    /// Gap between conversions.
    pub produce_every: Duration,
    /// Main-loop period.
    pub consume_every: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimOutcome {
    pub produced: u32,
    pub delivered: u32,
    pub dropped: u32,
    /// Delivered samples came out in the order they were produced.
    pub in_order: bool,
    /// Bytes the consumer wrote to its sink.
    pub sink_bytes: usize,
}

#[derive(Default)]
struct CountingSink {
    bytes: usize,
}

impl SampleSink for CountingSink {
    fn write_str(&mut self, s: &str) {
        self.bytes += s.len();
    }
}

pub fn run(config: &SimConfig, progress: &ProgressBar) -> SimOutcome {
    let mut ring = SampleRing::<ADC_BUFSIZE>::new();
    let (producer, consumer) = ring.split();
    let mut sampler = AnalogSampler::new(producer);
    let mut consumer = SampleConsumer::new(consumer);

    let done = AtomicBool::new(false);
    let dropped = AtomicU32::new(0);

    let mut sink = CountingSink::default();
    let mut delivered = 0u32;
    let mut in_order = true;
    let mut last: Option<u16> = None;

    thread::scope(|s| {
        s.spawn(|| {
            for raw in 0..config.samples {
                if !sampler.on_conversion(raw) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
                if !config.produce_every.is_zero() {
                    thread::sleep(config.produce_every);
                }
            }
            done.store(true, Ordering::Release);
            debug!("producer finished");
        });

        loop {
            // Check before polling so samples pushed right before `done`
            // are still drained on this pass.
            let finished = done.load(Ordering::Acquire);

            match consumer.poll(&mut sink) {
                Some(sample) => {
                    let raw = sample as u16;
                    if last.is_some_and(|prev| raw <= prev) {
                        in_order = false;
                    }
                    last = Some(raw);
                    delivered += 1;
                    progress.set_position(u64::from(delivered + dropped.load(Ordering::Relaxed)));
                }
                None if finished => break,
                None => {}
            }

            if !config.consume_every.is_zero() {
                thread::sleep(config.consume_every);
            } else {
                thread::yield_now();
            }
        }
    });

    let outcome = SimOutcome {
        produced: u32::from(config.samples),
        delivered,
        dropped: dropped.into_inner(),
        in_order,
        sink_bytes: sink.bytes,
    };
    info!(
        produced = outcome.produced,
        delivered = outcome.delivered,
        dropped = outcome.dropped,
        "simulation finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sample_delivered_or_dropped() {
        let config = SimConfig {
            samples: 2000,
            produce_every: Duration::ZERO,
            consume_every: Duration::ZERO,
        };
        let outcome = run(&config, &ProgressBar::hidden());

        assert_eq!(outcome.delivered + outcome.dropped, outcome.produced);
        assert!(outcome.in_order);
        assert!(outcome.delivered >= ADC_BUFSIZE as u32 - 1);
    }

    #[test]
    fn test_slow_main_loop_drops_samples() {
        let config = SimConfig {
            samples: 300,
            produce_every: Duration::ZERO,
            consume_every: Duration::from_millis(5),
        };
        let outcome = run(&config, &ProgressBar::hidden());

        assert!(outcome.dropped > 0);
        assert_eq!(outcome.delivered + outcome.dropped, 300);
        assert!(outcome.in_order);
    }

    #[test]
    fn test_sink_receives_formatted_samples() {
        let config = SimConfig {
            samples: 3,
            produce_every: Duration::ZERO,
            consume_every: Duration::ZERO,
        };
        let outcome = run(&config, &ProgressBar::hidden());

        // "0,1,2," -- nothing can drop with three samples in a 32-slot ring
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.sink_bytes, 6);
    }
}
