//! Main-loop side of the sample pipeline.
//!
//! The main loop never waits on the ring. It pops at most one sample per
//! pass, prints it as `<decimal>,` and goes back to its other duties.

use core::fmt::Write;

use heapless::String;

use crate::ring::Consumer;
use crate::SAMPLE_SEPARATOR;

/// Longest decimal rendering of an `i16` ("-32768").
pub const SAMPLE_STR_LEN: usize = 6;

/// Where formatted samples go. On the board this is the UART transmitter.
pub trait SampleSink {
    fn write_str(&mut self, s: &str);
}

/// Render a sample as a signed decimal string.
pub fn format_sample(sample: i16) -> String<SAMPLE_STR_LEN> {
    let mut out = String::new();
    // Every i16 fits in SAMPLE_STR_LEN characters.
    let _ = write!(out, "{}", sample);
    out
}

pub struct SampleConsumer<'a, const N: usize> {
    consumer: Consumer<'a, N>,
}

impl<'a, const N: usize> SampleConsumer<'a, N> {
    pub const fn new(consumer: Consumer<'a, N>) -> Self {
        Self { consumer }
    }

    /// Pop one sample, if any, and forward it to `sink`.
    ///
    /// Returns the forwarded sample, or `None` when the ring was empty and
    /// the caller should back off before polling again.
    pub fn poll<S: SampleSink>(&mut self, sink: &mut S) -> Option<i16> {
        let sample = self.consumer.try_pop()?;
        sink.write_str(&format_sample(sample));
        sink.write_str(SAMPLE_SEPARATOR);
        Some(sample)
    }

    /// Samples waiting in the ring.
    pub fn backlog(&self) -> usize {
        self.consumer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SampleRing;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Capture(std::string::String);

    impl SampleSink for Capture {
        fn write_str(&mut self, s: &str) {
            self.0.push_str(s);
        }
    }

    #[test]
    fn test_format_extremes() {
        assert_eq!(format_sample(0).as_str(), "0");
        assert_eq!(format_sample(1023).as_str(), "1023");
        assert_eq!(format_sample(-1).as_str(), "-1");
        assert_eq!(format_sample(i16::MIN).as_str(), "-32768");
        assert_eq!(format_sample(i16::MAX).as_str(), "32767");
    }

    #[test]
    fn test_poll_forwards_one_sample_per_call() {
        let mut ring = SampleRing::<8>::new();
        let (mut producer, consumer) = ring.split();
        let mut consumer = SampleConsumer::new(consumer);
        let mut sink = Capture::default();

        producer.try_push(12);
        producer.try_push(-340);

        assert_eq!(consumer.poll(&mut sink), Some(12));
        assert_eq!(sink.0, "12,");
        assert_eq!(consumer.backlog(), 1);

        assert_eq!(consumer.poll(&mut sink), Some(-340));
        assert_eq!(sink.0, "12,-340,");
    }

    #[test]
    fn test_poll_empty_writes_nothing() {
        let mut ring = SampleRing::<8>::new();
        let (_, consumer) = ring.split();
        let mut consumer = SampleConsumer::new(consumer);
        let mut sink = Capture::default();

        assert_eq!(consumer.poll(&mut sink), None);
        assert!(sink.0.is_empty());
    }

    proptest! {
        #[test]
        fn prop_format_round_trips(sample: i16) {
            let text = format_sample(sample);
            prop_assert!(text.len() <= SAMPLE_STR_LEN);
            prop_assert_eq!(text.parse::<i16>().ok(), Some(sample));
        }
    }
}
