use std::{cell::OnceCell, fmt, sync::Arc};

use realfft::num_complex::Complex32;

use crate::{
    hann_window, AnalysisConfig, BandLayout, Bands, EnvelopeSmoother, PersistentScalars, Result,
    SampleProducer, SampleRing, SpectralTransform,
};

/// Owns every buffer of the analysis and runs one pass per rendered frame.
///
/// The audio side only ever touches the shared [`SampleRing`], either through
/// [`AnalysisPipeline::on_audio_samples`] or a [`SampleProducer`] handed to
/// the audio thread. Everything else is consumer-owned scratch memory.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    ring: Arc<SampleRing>,
    window: OnceCell<Box<[f32]>>,
    transform: SpectralTransform,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    layout: Option<BandLayout>,
    normalized: Vec<f32>,
    smoother: EnvelopeSmoother,
    source_sample_rate: Option<u32>,
    paused: bool,
    frames_analysed: u64,
}

impl AnalysisPipeline {
    /// Builds a pipeline after validating `config`.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let size = config.fft_size;
        let smoother = EnvelopeSmoother::new(config.smoothing.clone(), config.band_count);
        tracing::debug!(
            fft_size = size,
            band_count = config.band_count,
            "created analysis pipeline"
        );

        Ok(Self {
            ring: Arc::new(SampleRing::new(size)),
            window: OnceCell::new(),
            transform: SpectralTransform::new(size),
            frame: vec![0.0; size],
            spectrum: vec![Complex32::new(0.0, 0.0); size],
            layout: None,
            normalized: vec![0.0; config.band_count],
            smoother,
            source_sample_rate: None,
            paused: false,
            frames_analysed: 0,
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Handle for the audio callback. Clones share the same ring.
    pub fn producer(&self) -> SampleProducer {
        SampleProducer::new(self.ring.clone())
    }

    /// Feeds one interleaved block from the playback side. Only channel 0 of
    /// each frame is kept.
    pub fn on_audio_samples(&self, buffer: &[f32], frame_count: usize, channel_count: usize) {
        self.ring.push_frames(buffer, frame_count, channel_count);
    }

    /// Number of samples pushed since the last reset.
    pub fn samples_written(&self) -> usize {
        self.ring.written()
    }

    /// Forgets everything about the previous track: samples, spectrum, band
    /// values, trails and the loudness trackers.
    ///
    /// The playback side detaches its audio callback before calling this.
    pub fn on_track_change(&mut self) {
        self.ring.clear();
        self.frame.fill(0.0);
        self.spectrum.fill(Complex32::new(0.0, 0.0));
        self.normalized.fill(0.0);
        self.smoother.reset();
        tracing::debug!(frames_analysed = self.frames_analysed, "analysis state reset");
    }

    /// Starts a new source. Resets the pipeline and resumes analysis.
    pub fn attach_source(&mut self, sample_rate: u32) {
        self.on_track_change();
        self.source_sample_rate = Some(sample_rate);
        self.paused = false;
        tracing::debug!(sample_rate, "source attached");
    }

    pub fn detach_source(&mut self) {
        if let Some(sample_rate) = self.source_sample_rate.take() {
            tracing::debug!(sample_rate, "source detached");
        }
    }

    /// Sample rate of the attached source, if any.
    pub fn source_sample_rate(&self) -> Option<u32> {
        self.source_sample_rate
    }

    /// While paused, [`advance_frame`](Self::advance_frame) keeps returning
    /// the last bands untouched.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::debug!(paused, "analysis pause toggled");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn bands(&self) -> &Bands {
        self.smoother.bands()
    }

    pub fn scalars(&self) -> PersistentScalars {
        self.smoother.scalars()
    }

    /// Layout used by the most recent analysed frame.
    pub fn layout(&self) -> Option<&BandLayout> {
        self.layout.as_ref()
    }

    pub fn frames_analysed(&self) -> u64 {
        self.frames_analysed
    }

    /// Runs window, transform, bucketize and smooth over the latest samples
    /// and returns the updated bands.
    ///
    /// A `sample_rate` of zero means no source is playing; the bands are
    /// returned as they are. Panics if `band_count` is zero.
    pub fn advance_frame(&mut self, sample_rate: u32, band_count: usize, delta_seconds: f32) -> &Bands {
        assert!(band_count > 0, "band count must be at least 1");

        if band_count != self.normalized.len() {
            tracing::debug!(
                from = self.normalized.len(),
                to = band_count,
                "band count changed"
            );
            self.normalized.resize(band_count, 0.0);
            self.smoother.resize(band_count);
        }

        if self.paused || sample_rate == 0 {
            return self.smoother.bands();
        }

        let size = self.config.fft_size;
        self.ring.snapshot(&mut self.frame);
        let window = self.window.get_or_init(|| hann_window(size));
        for (sample, coefficient) in self.frame.iter_mut().zip(window.iter()) {
            *sample *= coefficient;
        }

        self.transform.process(&self.frame, &mut self.spectrum);

        if self
            .layout
            .as_ref()
            .is_some_and(|layout| !layout.matches(sample_rate, size, band_count))
        {
            self.layout = None;
        }
        let min_frequency_hz = self.config.min_frequency_hz;
        let layout = self
            .layout
            .get_or_insert_with(|| BandLayout::new(sample_rate, size, band_count, min_frequency_hz));

        layout.bucketize(
            &self.spectrum[..size / 2],
            self.config.normalization_floor,
            &mut self.normalized,
        );

        self.frames_analysed += 1;
        self.smoother.update(&self.normalized, delta_seconds)
    }
}

impl fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("fft_size", &self.transform.size())
            .field("ring", &self.ring)
            .field("window_ready", &self.window.get().is_some())
            .field("band_count", &self.normalized.len())
            .field("source_sample_rate", &self.source_sample_rate)
            .field("paused", &self.paused)
            .field("frames_analysed", &self.frames_analysed)
            .finish()
    }
}
