//! ADC conversion-complete handler.
//!
//! The ADC runs free-running with its interrupt enabled, so every completed
//! conversion lands here exactly once. All this does is move the result into
//! the sample ring; anything slower belongs in the main loop.

use crate::ring::Producer;

pub struct AnalogSampler<'a, const N: usize> {
    producer: Producer<'a, N>,
}

impl<'a, const N: usize> AnalogSampler<'a, N> {
    pub const fn new(producer: Producer<'a, N>) -> Self {
        Self { producer }
    }

    /// Push one raw conversion result. Called from the ADC interrupt.
    ///
    /// The 16-bit data register is taken as a signed reading. If the ring is
    /// full the sample is lost; the return value only says whether it was kept.
    #[inline]
    pub fn on_conversion(&mut self, raw: u16) -> bool {
        self.producer.try_push(raw as i16)
    }

    /// Samples currently queued for the main loop.
    pub fn backlog(&self) -> usize {
        self.producer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SampleRing;

    #[test]
    fn test_conversion_is_queued() {
        let mut ring = SampleRing::<4>::new();
        let (producer, mut consumer) = ring.split();
        let mut sampler = AnalogSampler::new(producer);

        assert!(sampler.on_conversion(512));
        assert_eq!(sampler.backlog(), 1);
        assert_eq!(consumer.try_pop(), Some(512));
    }

    #[test]
    fn test_raw_value_read_as_signed() {
        let mut ring = SampleRing::<4>::new();
        let (producer, mut consumer) = ring.split();
        let mut sampler = AnalogSampler::new(producer);

        sampler.on_conversion(0xFFFF);
        sampler.on_conversion(0x03FF);
        assert_eq!(consumer.try_pop(), Some(-1));
        assert_eq!(consumer.try_pop(), Some(1023));
    }

    #[test]
    fn test_conversions_dropped_when_main_loop_falls_behind() {
        let mut ring = SampleRing::<4>::new();
        let (producer, mut consumer) = ring.split();
        let mut sampler = AnalogSampler::new(producer);

        let kept = (0..10u16).filter(|&raw| sampler.on_conversion(raw)).count();
        assert_eq!(kept, 3);
        assert_eq!(consumer.try_pop(), Some(0));
        assert_eq!(consumer.try_pop(), Some(1));
        assert_eq!(consumer.try_pop(), Some(2));
        assert_eq!(consumer.try_pop(), None);

        // Room again: the next conversion goes through.
        assert!(sampler.on_conversion(42));
        assert_eq!(consumer.try_pop(), Some(42));
    }
}
