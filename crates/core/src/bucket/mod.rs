use realfft::num_complex::Complex32;
use serde::Serialize;

use crate::transform::amplitude;

/// Contiguous run of FFT bins aggregated into one visual band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandRange {
    /// First bin (inclusive).
    pub start_bin: usize,
    /// Last bin (exclusive). Always greater than `start_bin`.
    pub end_bin: usize,
    pub low_hz: f32,
    pub high_hz: f32,
}

/// Logarithmic mapping from the linear bin spectrum onto `band_count` bands
/// spanning `min_frequency_hz` to Nyquist.
///
/// The layout only depends on its construction arguments, so the pipeline
/// keeps one around and rebuilds it when the source or band count changes.
#[derive(Debug, Clone)]
pub struct BandLayout {
    sample_rate: u32,
    fft_size: usize,
    ranges: Vec<BandRange>,
}

impl BandLayout {
    pub fn new(sample_rate: u32, fft_size: usize, band_count: usize, min_frequency_hz: f32) -> Self {
        assert!(sample_rate > 0, "band layout needs a known sample rate");
        assert!(band_count > 0, "band layout needs at least one band");

        let rate = sample_rate as f32;
        let max_frequency_hz = rate * 0.5;
        let span = max_frequency_hz / min_frequency_hz;
        let to_bin = |hz: f32| (hz * fft_size as f32 / rate) as usize;

        let ranges = (0..band_count)
            .map(|i| {
                let t0 = i as f32 / band_count as f32;
                let t1 = (i + 1) as f32 / band_count as f32;
                let low_hz = min_frequency_hz * span.powf(t0);
                let high_hz = min_frequency_hz * span.powf(t1);

                let start_bin = to_bin(low_hz);
                let mut end_bin = to_bin(high_hz);
                if end_bin <= start_bin {
                    end_bin = start_bin + 1;
                }

                BandRange {
                    start_bin,
                    end_bin,
                    low_hz,
                    high_hz,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(sample_rate, fft_size, band_count, "rebuilt band layout");

        Self {
            sample_rate,
            fft_size,
            ranges,
        }
    }

    /// Whether this layout was built for the given parameters.
    pub fn matches(&self, sample_rate: u32, fft_size: usize, band_count: usize) -> bool {
        self.sample_rate == sample_rate
            && self.fft_size == fft_size
            && self.ranges.len() == band_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn band_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    /// Index of the band whose frequency range `[low_hz, high_hz)` holds
    /// `frequency_hz`.
    pub fn band_containing(&self, frequency_hz: f32) -> Option<usize> {
        self.ranges
            .iter()
            .position(|range| range.low_hz <= frequency_hz && frequency_hz < range.high_hz)
    }

    /// Writes each band's peak amplitude, normalised by the loudest bin of the
    /// frame, into `out`.
    ///
    /// `half_spectrum` holds the non-negative frequency bins (`fft_size / 2`
    /// of them). The divisor never drops below `floor`, so silence maps to
    /// zeros.
    pub fn bucketize(&self, half_spectrum: &[Complex32], floor: f32, out: &mut [f32]) {
        assert_eq!(
            half_spectrum.len(),
            self.fft_size / 2,
            "bucketizer expects the non-negative half of the spectrum"
        );
        assert_eq!(out.len(), self.ranges.len(), "band output length mismatch");

        let max_amp = half_spectrum
            .iter()
            .map(|&bin| amplitude(bin))
            .fold(floor, f32::max);

        let bins = half_spectrum.len();
        for (range, band) in self.ranges.iter().zip(out.iter_mut()) {
            let start = range.start_bin.min(bins);
            let end = range.end_bin.min(bins);
            let peak = half_spectrum[start..end]
                .iter()
                .map(|&bin| amplitude(bin))
                .fold(0.0, f32::max);
            *band = peak / max_amp;
        }
    }
}
