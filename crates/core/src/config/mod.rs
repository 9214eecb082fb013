use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Top-level configuration for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of samples kept in the ring buffer and fed to the transform.
    /// Must be a power of two.
    pub fft_size: usize,
    /// Default number of visual bands.
    pub band_count: usize,
    /// Lower edge of the lowest band. The upper edge is always Nyquist.
    pub min_frequency_hz: f32,
    /// Smallest divisor used when normalising band amplitudes.
    pub normalization_floor: f32,
    pub smoothing: SmoothingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 1 << 13,
            band_count: 64,
            min_frequency_hz: 20.0,
            normalization_floor: 1e-6,
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parses a (possibly partial) JSON document. Missing fields fall back to
    /// their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(?path, fft_size = config.fft_size, "loaded analysis config");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every value the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(VisualiserError::invalid_config(format!(
                "fft_size must be a non-zero power of two, got {}",
                self.fft_size
            )));
        }
        if self.band_count == 0 {
            return Err(VisualiserError::invalid_config(
                "band_count must be at least 1",
            ));
        }
        if !(self.min_frequency_hz > 0.0) {
            return Err(VisualiserError::invalid_config(
                "min_frequency_hz must be positive",
            ));
        }
        if !(self.normalization_floor > 0.0) {
            return Err(VisualiserError::invalid_config(
                "normalization_floor must be positive",
            ));
        }
        self.smoothing.validate()
    }
}

/// Empirically tuned constants of the envelope smoother.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// How many of the lowest bands receive the bass boost.
    pub bass_bands: usize,
    /// Boost applied to band 0; decays linearly to 1.0 at `bass_bands`.
    pub bass_boost_max: f32,
    /// Weight of the new value in the `overall_level` moving average.
    pub level_blend: f32,
    /// Value `overall_level` starts from and returns to on reset.
    pub overall_level_default: f32,
    /// Loudness scale is `loudness_floor + loudness_gain * overall_level`.
    pub loudness_floor: f32,
    pub loudness_gain: f32,
    /// Weight of band 0's target in the `bass_history` moving average.
    pub bass_blend: f32,
    /// Upper bound for both targets and persisted band values.
    pub ceiling: f32,
    /// Approach rate (per second) while a band rises.
    pub attack_rate: f32,
    /// Approach rate (per second) while a band falls.
    pub decay_rate: f32,
    /// How strongly `bass_history` speeds up attack and decay.
    pub bass_responsiveness: f32,
    /// Fixed approach rate (per second) of the trailing values.
    pub trail_rate: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            bass_bands: 8,
            bass_boost_max: 4.5,
            level_blend: 0.05,
            overall_level_default: 0.5,
            loudness_floor: 0.6,
            loudness_gain: 0.8,
            bass_blend: 0.1,
            ceiling: 1.5,
            attack_rate: 18.0,
            decay_rate: 5.0,
            bass_responsiveness: 1.0,
            trail_rate: 3.0,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<()> {
        let blends = [
            ("level_blend", self.level_blend),
            ("bass_blend", self.bass_blend),
        ];
        for (name, value) in blends {
            if !(0.0..=1.0).contains(&value) {
                return Err(VisualiserError::invalid_config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }

        let rates = [
            ("attack_rate", self.attack_rate),
            ("decay_rate", self.decay_rate),
            ("trail_rate", self.trail_rate),
            ("ceiling", self.ceiling),
        ];
        for (name, value) in rates {
            if !(value > 0.0) {
                return Err(VisualiserError::invalid_config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if self.bass_boost_max < 1.0 {
            return Err(VisualiserError::invalid_config(
                "bass_boost_max must be at least 1.0",
            ));
        }
        if self.bass_responsiveness < 0.0 || self.loudness_floor < 0.0 || self.loudness_gain < 0.0
        {
            return Err(VisualiserError::invalid_config(
                "loudness and responsiveness factors must not be negative",
            ));
        }
        Ok(())
    }
}
