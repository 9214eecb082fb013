//! Lock-free history of the most recent mono samples.
//!
//! The audio thread is the single producer and the frame loop the single
//! consumer. The write cursor is published with release ordering after each
//! sample and loaded with acquire ordering before a snapshot. Sample slots
//! themselves are relaxed atomics: a snapshot taken while the producer keeps
//! writing may contain a handful of samples newer than the cursor it read.
//! That tear is accepted, the output only drives a visualisation.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use atomic_float::AtomicF32;

/// Fixed-capacity circular buffer of `f32` samples shared between the audio
/// producer and the analysis consumer.
pub struct SampleRing {
    slots: Box<[AtomicF32]>,
    mask: usize,
    /// Total number of samples ever pushed (wrapping). Only the producer
    /// stores to it.
    cursor: AtomicUsize,
}

impl SampleRing {
    /// Creates a zero-filled ring. `capacity` must be a non-zero power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a non-zero power of two, got {capacity}"
        );

        let slots = (0..capacity)
            .map(|_| AtomicF32::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: capacity - 1,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of samples pushed since construction or the last [`clear`].
    ///
    /// [`clear`]: SampleRing::clear
    pub fn written(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Appends one sample, overwriting the oldest. Never blocks or allocates.
    #[inline]
    pub fn push(&self, sample: f32) {
        let cursor = self.cursor.load(Ordering::Relaxed);
        self.slots[cursor & self.mask].store(sample, Ordering::Relaxed);
        self.cursor.store(cursor.wrapping_add(1), Ordering::Release);
    }

    /// Pushes channel 0 of every frame in an interleaved block.
    ///
    /// `frame_count` is clamped to what `interleaved` actually holds, and a
    /// zero channel count is ignored, so a misbehaving host cannot make the
    /// audio thread panic.
    #[inline]
    pub fn push_frames(&self, interleaved: &[f32], frame_count: usize, channel_count: usize) {
        if channel_count == 0 {
            return;
        }

        let frames = frame_count.min(interleaved.len() / channel_count);
        for frame in interleaved.chunks_exact(channel_count).take(frames) {
            self.push(frame[0]);
        }
    }

    /// Copies the most recent `capacity` samples into `dest`, oldest first.
    pub fn snapshot(&self, dest: &mut [f32]) {
        assert_eq!(
            dest.len(),
            self.slots.len(),
            "snapshot destination must match ring capacity"
        );

        // The slot at the cursor is the next one to be overwritten, which
        // makes it the oldest sample still held.
        let start = self.cursor.load(Ordering::Acquire);
        for (offset, out) in dest.iter_mut().enumerate() {
            let slot = &self.slots[start.wrapping_add(offset) & self.mask];
            *out = slot.load(Ordering::Relaxed);
        }
    }

    /// Zeroes every slot and rewinds the cursor.
    ///
    /// Must only be called while no producer is attached; the playback side
    /// detaches its callback around track switches.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0, Ordering::Relaxed);
        }
        self.cursor.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRing")
            .field("capacity", &self.capacity())
            .field("written", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}

/// Cloneable handle the audio callback writes through.
#[derive(Clone, Debug)]
pub struct SampleProducer {
    ring: Arc<SampleRing>,
}

impl SampleProducer {
    pub(crate) fn new(ring: Arc<SampleRing>) -> Self {
        Self { ring }
    }

    /// Feeds one interleaved block, keeping only the first channel.
    #[inline]
    pub fn push_frames(&self, interleaved: &[f32], frame_count: usize, channel_count: usize) {
        self.ring.push_frames(interleaved, frame_count, channel_count);
    }

    #[inline]
    pub fn push(&self, sample: f32) {
        self.ring.push(sample);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_silent() {
        let ring = SampleRing::new(16);
        ring.push(1.0);
        ring.push(2.0);

        let mut out = vec![f32::NAN; 16];
        ring.snapshot(&mut out);

        assert!(out[..14].iter().all(|&s| s == 0.0));
        assert_eq!(&out[14..], &[1.0, 2.0]);
    }

    #[test]
    fn exact_fill_preserves_order() {
        let ring = SampleRing::new(8);
        for i in 0..8 {
            ring.push(i as f32);
        }

        let mut out = vec![0.0; 8];
        ring.snapshot(&mut out);
        assert_eq!(out, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn overflow_keeps_latest_samples() {
        let ring = SampleRing::new(8);
        for i in 0..13 {
            ring.push(i as f32);
        }

        let mut out = vec![0.0; 8];
        ring.snapshot(&mut out);
        assert_eq!(out, (5..13).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(ring.written(), 13);
    }

    proptest! {
        /// After `capacity + extra` increasing pushes the snapshot holds the
        /// last `capacity` of them, oldest first.
        #[test]
        fn snapshot_returns_latest_in_order(exp in 0u32..=11, extra in 0usize..3000) {
            let capacity = 1usize << exp;
            let ring = SampleRing::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                ring.push(i as f32);
            }

            let mut out = vec![0.0; capacity];
            ring.snapshot(&mut out);
            let expected: Vec<f32> = (extra..total).map(|i| i as f32).collect();
            prop_assert_eq!(out, expected);
        }

        /// A partly filled ring reads as leading silence followed by the
        /// pushed samples.
        #[test]
        fn partial_fill_is_padded_with_silence(exp in 1u32..=11, fill in 1usize..2048) {
            let capacity = 1usize << exp;
            let fill = fill % capacity;
            let ring = SampleRing::new(capacity);
            for i in 0..fill {
                ring.push(i as f32 + 1.0);
            }

            let mut out = vec![f32::NAN; capacity];
            ring.snapshot(&mut out);
            let silent = capacity - fill;
            prop_assert!(out[..silent].iter().all(|&s| s == 0.0));
            let expected: Vec<f32> = (0..fill).map(|i| i as f32 + 1.0).collect();
            prop_assert_eq!(&out[silent..], &expected[..]);
        }
    }

    #[test]
    fn takes_first_channel_of_interleaved_frames() {
        let ring = SampleRing::new(4);
        let stereo = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0];
        ring.push_frames(&stereo, 4, 2);

        let mut out = vec![0.0; 4];
        ring.snapshot(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn ignores_frames_beyond_the_buffer() {
        let ring = SampleRing::new(4);
        ring.push_frames(&[1.0, 0.0, 2.0], 10, 2);
        ring.push_frames(&[9.0], 1, 0);

        assert_eq!(ring.written(), 1);
    }

    #[test]
    fn clear_restores_silence() {
        let ring = SampleRing::new(4);
        for _ in 0..6 {
            ring.push(0.75);
        }
        ring.clear();

        let mut out = vec![1.0; 4];
        ring.snapshot(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(ring.written(), 0);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two_capacity() {
        let _ = SampleRing::new(12);
    }

    #[test]
    fn concurrent_snapshots_only_see_pushed_values() {
        let ring = Arc::new(SampleRing::new(256));
        let producer = SampleProducer::new(ring.clone());
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200_000_u32 {
                    producer.push((i % 1000) as f32 + 1.0);
                }
                done.store(true, Ordering::Release);
            });

            let mut out = vec![0.0; 256];
            while !done.load(Ordering::Acquire) {
                ring.snapshot(&mut out);
                assert!(out
                    .iter()
                    .all(|&s| s == 0.0 || (1.0..=1000.0).contains(&s)));
            }
        });

        let mut out = vec![0.0; 256];
        ring.snapshot(&mut out);
        let expected: Vec<f32> = (200_000 - 256..200_000_u32)
            .map(|i| (i % 1000) as f32 + 1.0)
            .collect();
        assert_eq!(out, expected);
    }
}
