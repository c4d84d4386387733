//! Lock-free single-producer/single-consumer ring of ADC samples.
//!
//! `head` is the slot most recently written and `tail` the slot most recently
//! consumed. The ring is empty when they are equal, and one slot is always
//! left unused so a full ring never looks empty. A push into a full ring is
//! dropped on the floor: the producer runs in an interrupt and must not wait.
//!
//! `head` is only ever stored by the [`Producer`] and `tail` only by the
//! [`Consumer`]. Each side publishes its index with `Release` after touching
//! the slot and reads the other side's index with `Acquire`, so no lock is
//! needed. The indices are 8-bit, which is the widest store AVR performs in a
//! single instruction.

use core::cell::UnsafeCell;

use portable_atomic::{AtomicU8, Ordering};

pub struct SampleRing<const N: usize> {
    storage: UnsafeCell<[i16; N]>,
    head: AtomicU8,
    tail: AtomicU8,
}

// SAFETY: slots are only written by the single `Producer` before it publishes
// `head`, and only read by the single `Consumer` after it observes that `head`.
// `split` hands out at most one of each per exclusive borrow.
unsafe impl<const N: usize> Sync for SampleRing<N> {}

impl<const N: usize> SampleRing<N> {
    const VALID_CAPACITY: () = assert!(N >= 2 && N <= 256, "ring capacity must be 2..=256");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            storage: UnsafeCell::new([0; N]),
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
        }
    }

    /// Number of slots, including the one that is always kept free.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Split into the producer and consumer halves.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        (Producer { ring: self }, Consumer { ring: self })
    }

    /// Number of samples waiting to be popped.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire) as usize;
        let tail = self.tail.load(Ordering::Acquire) as usize;
        (head + N - tail) % N
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn advance(index: u8) -> u8 {
        let next = index as usize + 1;
        if next >= N {
            0
        } else {
            next as u8
        }
    }

    #[inline(always)]
    fn slot(&self, index: u8) -> *mut i16 {
        // Stays inside the array: indices are always < N.
        unsafe { (self.storage.get() as *mut i16).add(index as usize) }
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write half of a [`SampleRing`]. Owned by the ADC interrupt.
pub struct Producer<'a, const N: usize> {
    ring: &'a SampleRing<N>,
}

impl<const N: usize> Producer<'_, N> {
    /// Store `sample` in the slot after `head`.
    ///
    /// Returns `false` and leaves the ring untouched when it is full.
    pub fn try_push(&mut self, sample: i16) -> bool {
        let ring = self.ring;
        let next = SampleRing::<N>::advance(ring.head.load(Ordering::Relaxed));

        if next == ring.tail.load(Ordering::Acquire) {
            return false;
        }

        // SAFETY: `next` is past `head` and not equal to `tail`, so the
        // consumer will not read this slot until `head` is published below.
        unsafe { ring.slot(next).write_volatile(sample) };
        ring.head.store(next, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Read half of a [`SampleRing`]. Owned by the main loop.
pub struct Consumer<'a, const N: usize> {
    ring: &'a SampleRing<N>,
}

impl<const N: usize> Consumer<'_, N> {
    /// Take the oldest sample, or `None` if the ring is empty.
    pub fn try_pop(&mut self) -> Option<i16> {
        let ring = self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        if ring.head.load(Ordering::Acquire) == tail {
            return None;
        }

        let next = SampleRing::<N>::advance(tail);
        // SAFETY: the producer published this slot through `head` and will not
        // reuse it until `tail` moves past it below.
        let sample = unsafe { ring.slot(next).read_volatile() };
        ring.tail.store(next, Ordering::Release);
        Some(sample)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[test]
    fn test_new_ring_is_empty() {
        let mut ring = SampleRing::<8>::new();
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 8);

        let (_, mut consumer) = ring.split();
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_push_pop_fifo() {
        let mut ring = SampleRing::<8>::new();
        let (mut producer, mut consumer) = ring.split();

        assert!(producer.try_push(-5));
        assert!(producer.try_push(0));
        assert!(producer.try_push(1023));
        assert_eq!(consumer.len(), 3);

        assert_eq!(consumer.try_pop(), Some(-5));
        assert_eq!(consumer.try_pop(), Some(0));
        assert_eq!(consumer.try_pop(), Some(1023));
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_pop_empty_does_not_move_tail() {
        let mut ring = SampleRing::<4>::new();
        {
            let (mut producer, mut consumer) = ring.split();
            producer.try_push(7);
            assert_eq!(consumer.try_pop(), Some(7));
            assert_eq!(consumer.try_pop(), None);
            assert_eq!(consumer.try_pop(), None);
        }
        assert_eq!(ring.tail.load(Ordering::Relaxed), 1);
        assert_eq!(ring.head.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_full_ring_keeps_31_of_32() {
        let mut ring = SampleRing::<32>::new();
        let (mut producer, mut consumer) = ring.split();

        let accepted: Vec<bool> = (0..32).map(|i| producer.try_push(i * 10)).collect();
        assert!(accepted[..31].iter().all(|&ok| ok));
        assert!(!accepted[31]);
        assert_eq!(producer.len(), 31);

        for i in 0..31 {
            assert_eq!(consumer.try_pop(), Some(i * 10));
        }
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_full_push_leaves_indices_alone() {
        let mut ring = SampleRing::<4>::new();
        {
            let (mut producer, _) = ring.split();
            for i in 0..3 {
                assert!(producer.try_push(i));
            }
            assert!(!producer.try_push(99));
        }
        assert_eq!(ring.head.load(Ordering::Relaxed), 3);
        assert_eq!(ring.tail.load(Ordering::Relaxed), 0);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_wrap_around() {
        let mut ring = SampleRing::<4>::new();
        let (mut producer, mut consumer) = ring.split();

        for round in 0..10i16 {
            assert!(producer.try_push(round));
            assert!(producer.try_push(-round));
            assert_eq!(consumer.try_pop(), Some(round));
            assert_eq!(consumer.try_pop(), Some(-round));
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_full_size_index_range() {
        let mut ring = SampleRing::<256>::new();
        let (mut producer, mut consumer) = ring.split();

        for i in 0..255 {
            assert!(producer.try_push(i));
        }
        assert!(!producer.try_push(255));
        assert_eq!(consumer.try_pop(), Some(0));
        assert!(producer.try_push(255));
        for i in 1..=255 {
            assert_eq!(consumer.try_pop(), Some(i));
        }
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_threaded_spsc_preserves_order() {
        let mut ring = SampleRing::<16>::new();
        let (mut producer, mut consumer) = ring.split();
        const COUNT: i16 = 5000;

        std::thread::scope(|s| {
            s.spawn(move || {
                let mut next = 0;
                while next < COUNT {
                    if producer.try_push(next) {
                        next += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            });

            let mut expected = 0;
            while expected < COUNT {
                match consumer.try_pop() {
                    Some(sample) => {
                        assert_eq!(sample, expected);
                        expected += 1;
                    }
                    None => std::thread::yield_now(),
                }
            }
        });
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(i16),
        Pop,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<i16>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn prop_matches_bounded_queue(ops in proptest::collection::vec(op(), 0..300)) {
            let mut ring = SampleRing::<8>::new();
            let (mut producer, mut consumer) = ring.split();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(sample) => {
                        let accepted = producer.try_push(sample);
                        prop_assert_eq!(accepted, model.len() < 7);
                        if accepted {
                            model.push_back(sample);
                        }
                    }
                    Op::Pop => prop_assert_eq!(consumer.try_pop(), model.pop_front()),
                }
                prop_assert!(consumer.len() <= 7);
                prop_assert_eq!(consumer.len(), model.len());
            }
        }

        #[test]
        fn prop_fifo_without_overflow(samples in proptest::collection::vec(any::<i16>(), 0..32)) {
            let mut ring = SampleRing::<32>::new();
            let (mut producer, mut consumer) = ring.split();
            let expected: Vec<i16> = samples.iter().copied().take(31).collect();

            for &sample in &expected {
                prop_assert!(producer.try_push(sample));
            }
            let drained: Vec<i16> = core::iter::from_fn(|| consumer.try_pop()).collect();
            prop_assert_eq!(drained, expected);
        }
    }
}
