//! Real-time spectrum analysis for bar visualisers.
//!
//! Audio arrives on a producer thread and lands in a lock-free
//! [`SampleRing`]. Once per rendered frame the [`AnalysisPipeline`] windows
//! the most recent samples, runs a radix-2 FFT, folds the bins into
//! logarithmically spaced bands and smooths them into [`Bands`] that a
//! renderer can draw directly.

pub mod analysis;
pub mod audio;
pub mod bucket;
pub mod config;
pub mod error;
pub mod smoothing;
pub mod transform;

pub use analysis::AnalysisPipeline;
pub use audio::{SampleProducer, SampleRing};
pub use bucket::{BandLayout, BandRange};
pub use config::{AnalysisConfig, SmoothingConfig};
pub use error::{Result, VisualiserError};
pub use smoothing::{Bands, EnvelopeSmoother, PersistentScalars};
pub use transform::{amplitude, hann_window, transform, SpectralTransform};
