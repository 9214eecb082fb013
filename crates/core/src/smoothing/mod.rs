use serde::Serialize;

use crate::SmoothingConfig;

/// Band intensities handed to the renderer once per frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bands {
    values: Vec<f32>,
    trails: Vec<f32>,
    bass_energy: f32,
}

impl Bands {
    fn with_len(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            trails: vec![0.0; len],
            bass_energy: 0.0,
        }
    }

    /// Smoothed intensity per band, lowest frequency first, in
    /// `[0, ceiling]`.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Slower followers of [`values`](Bands::values) for motion trails.
    pub fn trails(&self) -> &[f32] {
        &self.trails
    }

    /// Sum of the boosted bass bands in the most recent frame.
    pub fn bass_energy(&self) -> f32 {
        self.bass_energy
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of the band with the highest value, if any.
    pub fn loudest(&self) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
    }

    fn clear(&mut self) {
        self.values.fill(0.0);
        self.trails.fill(0.0);
        self.bass_energy = 0.0;
    }
}

/// Slow trackers that survive across frames and modulate the smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PersistentScalars {
    /// Moving average of band 0's target.
    pub bass_history: f32,
    /// Moving average, one step per frame, of the mean normalised
    /// (pre-boost) band value.
    pub overall_level: f32,
}

impl PersistentScalars {
    pub fn neutral(config: &SmoothingConfig) -> Self {
        Self {
            bass_history: 0.0,
            overall_level: config.overall_level_default,
        }
    }
}

/// Per-band envelope follower with asymmetric attack and decay.
///
/// Each frame turns the bucketizer's normalised values into targets (bass
/// boost, square-root compression, loudness scaling, ceiling) and moves the
/// persisted values toward them at a rate proportional to the frame time.
#[derive(Debug, Clone)]
pub struct EnvelopeSmoother {
    config: SmoothingConfig,
    bands: Bands,
    scalars: PersistentScalars,
}

impl EnvelopeSmoother {
    pub fn new(config: SmoothingConfig, band_count: usize) -> Self {
        let scalars = PersistentScalars::neutral(&config);
        Self {
            config,
            bands: Bands::with_len(band_count),
            scalars,
        }
    }

    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    pub fn scalars(&self) -> PersistentScalars {
        self.scalars
    }

    /// Returns every band, trail and tracker to its initial value.
    pub fn reset(&mut self) {
        self.bands.clear();
        self.scalars = PersistentScalars::neutral(&self.config);
    }

    /// Changes the number of bands. Existing bands keep their values, new
    /// ones start at zero.
    pub fn resize(&mut self, band_count: usize) {
        self.bands.values.resize(band_count, 0.0);
        self.bands.trails.resize(band_count, 0.0);
    }

    /// Gain applied to band `index` before compression.
    pub fn bass_boost(&self, index: usize) -> f32 {
        let bass_bands = self.config.bass_bands;
        if index >= bass_bands {
            return 1.0;
        }

        let fraction = index as f32 / bass_bands as f32;
        self.config.bass_boost_max - (self.config.bass_boost_max - 1.0) * fraction
    }

    /// Advances every band by one frame lasting `delta_seconds`.
    pub fn update(&mut self, normalized: &[f32], delta_seconds: f32) -> &Bands {
        assert_eq!(
            normalized.len(),
            self.bands.len(),
            "smoother input length must match band count"
        );

        let dt = delta_seconds.max(0.0);
        let ceiling = self.config.ceiling;
        let bass_keep = 1.0 - self.config.bass_blend;
        let mut bass_energy = 0.0;

        let frame_level = if normalized.is_empty() {
            0.0
        } else {
            normalized.iter().map(|v| v.max(0.0)).sum::<f32>() / normalized.len() as f32
        };
        self.scalars.overall_level = self.scalars.overall_level * (1.0 - self.config.level_blend)
            + frame_level * self.config.level_blend;
        // Every band of a frame shares one loudness factor.
        let loudness =
            self.config.loudness_floor + self.config.loudness_gain * self.scalars.overall_level;

        for (index, &raw) in normalized.iter().enumerate() {
            let level = raw.max(0.0);
            let boosted = level * self.bass_boost(index);
            if index < self.config.bass_bands {
                bass_energy += boosted;
            }

            let compressed = boosted.sqrt();
            let target = (compressed * loudness).min(ceiling);

            if index == 0 {
                self.scalars.bass_history =
                    self.scalars.bass_history * bass_keep + target * self.config.bass_blend;
            }

            let responsiveness = 1.0 + self.config.bass_responsiveness * self.scalars.bass_history;
            let value = self.bands.values[index];
            let base_rate = if target > value {
                self.config.attack_rate
            } else {
                self.config.decay_rate
            };
            let rate = base_rate * responsiveness;

            let value = approach(value, target, rate, dt).clamp(0.0, ceiling);
            self.bands.values[index] = value;

            let trail = self.bands.trails[index];
            self.bands.trails[index] =
                approach(trail, value, self.config.trail_rate, dt).clamp(0.0, ceiling);
        }

        self.bands.bass_energy = bass_energy;
        &self.bands
    }
}

/// Moves `current` toward `target` by `rate * dt` of the remaining distance.
/// The step is capped at the full distance so long frames cannot overshoot.
#[inline]
fn approach(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    current + (target - current) * (rate * dt).min(1.0)
}
