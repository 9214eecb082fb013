//! Fixed-size radix-2 FFT plus the helpers the analysis pass needs around it.
//!
//! The plan runs the Cooley-Tukey decimation-in-time butterflies
//! iteratively: inputs are scattered in bit-reversed order, then merged
//! stage by stage with `X[k] = E[k] + W·O[k]`, `X[k + n/2] = E[k] - W·O[k]`
//! where `W = e^(-2πi·k/n)`. This produces the same values as the textbook
//! recursive formulation while keeping the twiddles in a table.

use std::{f64::consts::PI, fmt};

use realfft::num_complex::Complex32;

/// Precomputed transform for one power-of-two size.
pub struct SpectralTransform {
    size: usize,
    twiddles: Vec<Complex32>,
    bit_reverse: Vec<usize>,
}

impl SpectralTransform {
    /// Builds a plan. Panics unless `size` is a non-zero power of two.
    pub fn new(size: usize) -> Self {
        assert!(
            size.is_power_of_two(),
            "transform size must be a non-zero power of two, got {size}"
        );

        // Computed in f64 so the table matches the per-call `cexp` closely.
        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / size as f64;
                Complex32::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size)
            .map(|i| {
                if bits == 0 {
                    0
                } else {
                    i.reverse_bits() >> (usize::BITS - bits)
                }
            })
            .collect();

        Self {
            size,
            twiddles,
            bit_reverse,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Transforms `input` into `output`. Both must hold exactly `size`
    /// values. Does not allocate.
    pub fn process(&self, input: &[f32], output: &mut [Complex32]) {
        assert_eq!(input.len(), self.size, "transform input length mismatch");
        assert_eq!(output.len(), self.size, "transform output length mismatch");

        for (out, &source) in output.iter_mut().zip(&self.bit_reverse) {
            *out = Complex32::new(input[source], 0.0);
        }

        let mut len = 2;
        while len <= self.size {
            let half = len / 2;
            let stride = self.size / len;
            for block in output.chunks_exact_mut(len) {
                let (evens, odds) = block.split_at_mut(half);
                for (k, (even, odd)) in evens.iter_mut().zip(odds.iter_mut()).enumerate() {
                    let twisted = self.twiddles[k * stride] * *odd;
                    let e = *even;
                    *even = e + twisted;
                    *odd = e - twisted;
                }
            }
            len *= 2;
        }
    }
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("size", &self.size)
            .finish()
    }
}

/// One-shot transform of a real signal whose length is a power of two.
pub fn transform(input: &[f32]) -> Vec<Complex32> {
    let plan = SpectralTransform::new(input.len());
    let mut output = vec![Complex32::new(0.0, 0.0); input.len()];
    plan.process(input, &mut output);
    output
}

/// Cheap magnitude proxy: the larger of `|re|` and `|im|`.
///
/// Reads lower than the Euclidean norm by up to a factor of √2. Bar heights
/// are tuned against this proxy, so it must not be swapped for `norm()`.
#[inline]
pub fn amplitude(z: Complex32) -> f32 {
    z.re.abs().max(z.im.abs())
}

/// Symmetric Hann window of `len` coefficients.
pub fn hann_window(len: usize) -> Box<[f32]> {
    (0..len).map(|index| hann_value(index, len)).collect()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 * (1.0 - ((2.0 * std::f32::consts::PI * index as f32) / (len as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use realfft::RealFftPlanner;

    use super::*;

    fn signal(len: usize, seed: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let x = i as f32;
                (x * 0.37 * seed).sin() + 0.5 * (x * 1.91 + seed).cos() - 0.25
            })
            .collect()
    }

    fn assert_close(a: Complex32, b: Complex32, tolerance: f32) {
        assert!(
            (a - b).norm() <= tolerance,
            "{a} and {b} differ by more than {tolerance}"
        );
    }

    /// Stride-doubling recursion, kept as the reference definition.
    fn recursive(input: &[f32], stride: usize, out: &mut [Complex32]) {
        let n = out.len();
        if n == 1 {
            out[0] = Complex32::new(input[0], 0.0);
            return;
        }

        let (evens, odds) = out.split_at_mut(n / 2);
        recursive(input, stride * 2, evens);
        recursive(&input[stride..], stride * 2, odds);

        for k in 0..n / 2 {
            let angle = -2.0 * std::f32::consts::PI * k as f32 / n as f32;
            let w = Complex32::new(angle.cos(), angle.sin());
            let v = w * odds[k];
            let e = evens[k];
            evens[k] = e + v;
            odds[k] = e - v;
        }
    }

    #[test]
    fn size_one_is_identity() {
        let out = transform(&[0.625]);
        assert_eq!(out, vec![Complex32::new(0.625, 0.0)]);
    }

    /// Power-of-two length, two signals of that length and two coefficients.
    fn linear_case() -> impl Strategy<Value = (Vec<f32>, Vec<f32>, f32, f32)> {
        (1u32..=10).prop_flat_map(|exp| {
            let n = 1usize << exp;
            (
                prop::collection::vec(-1.0f32..1.0, n),
                prop::collection::vec(-1.0f32..1.0, n),
                -4.0f32..4.0,
                -4.0f32..4.0,
            )
        })
    }

    proptest! {
        /// An impulse at index 0 spreads evenly over every bin.
        #[test]
        fn impulse_has_flat_spectrum(exp in 0u32..=12, gain in 0.01f32..10.0) {
            let n = 1usize << exp;
            let mut input = vec![0.0; n];
            input[0] = gain;

            for bin in transform(&input) {
                prop_assert!((amplitude(bin) - gain).abs() <= 1e-5 * gain);
            }
        }

        /// transform(a·x + b·y) = a·transform(x) + b·transform(y)
        #[test]
        fn is_linear((x, y, a, b) in linear_case()) {
            let n = x.len();
            let mixed: Vec<f32> = x.iter().zip(&y).map(|(x, y)| a * x + b * y).collect();

            let fx = transform(&x);
            let fy = transform(&y);
            let fm = transform(&mixed);
            let tolerance = 1e-5 * n as f32 * (1.0 + a.abs() + b.abs());
            for k in 0..n {
                let expected = fx[k] * a + fy[k] * b;
                prop_assert!(
                    (fm[k] - expected).norm() <= tolerance,
                    "bin {} of {}: {} vs {}", k, n, fm[k], expected
                );
            }
        }
    }

    #[test]
    fn matches_recursive_definition() {
        let n = 256;
        let input = signal(n, 0.8);
        let mut expected = vec![Complex32::new(0.0, 0.0); n];
        recursive(&input, 1, &mut expected);

        let out = transform(&input);
        for k in 0..n {
            assert_close(out[k], expected[k], 5e-3);
        }
    }

    #[test]
    fn agrees_with_realfft() {
        let n = 2048;
        let input = signal(n, 1.3);

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(n);
        let mut scratch_input = input.clone();
        let mut expected = plan.make_output_vec();
        plan.process(&mut scratch_input, &mut expected).unwrap();

        let out = transform(&input);
        for (k, reference) in expected.iter().enumerate() {
            assert_close(out[k], *reference, 2e-2);
        }
    }

    #[test]
    fn pure_tone_peaks_in_its_bin() {
        let n = 64;
        let input: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 5.0 * i as f32 / n as f32).sin())
            .collect();

        let out = transform(&input);
        let peak = (0..n / 2)
            .max_by(|&a, &b| amplitude(out[a]).total_cmp(&amplitude(out[b])))
            .unwrap();
        assert_eq!(peak, 5);
        assert!((amplitude(out[5]) - 32.0).abs() < 1e-3);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_non_power_of_two() {
        let _ = transform(&[0.0; 6]);
    }

    #[test]
    fn amplitude_is_infinity_norm() {
        assert_eq!(amplitude(Complex32::new(0.0, 0.0)), 0.0);
        assert_eq!(amplitude(Complex32::new(3.0, 4.0)), 4.0);
        assert_eq!(amplitude(Complex32::new(-7.0, 2.0)), 7.0);
    }

    #[test]
    fn hann_window_is_symmetric_and_tapered() {
        let window = hann_window(9);
        assert_eq!(window[0], 0.0);
        assert!((window[4] - 1.0).abs() < 1e-6);
        for i in 0..9 {
            assert!((window[i] - window[8 - i]).abs() < 1e-6);
        }
        assert_eq!(&*hann_window(1), &[1.0]);
    }
}
