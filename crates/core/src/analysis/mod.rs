//! Offline feature extraction over a decoded track.
//!
//! [`AnalysisEngine::run`] computes one magnitude STFT and hands it to every
//! stage that works on magnitude spectra. Key detection and loudness work from
//! the samples directly because they need a different framing or a
//! time-domain filter.

pub mod key;
pub mod loudness;
pub mod segment;
pub mod spectral;
pub mod stft;
pub mod tempo;

use std::fmt;

use crate::{
    analysis::{key::KeyEstimate, spectral::SpectralShape, stft::Spectrogram},
    config::AnalyzerConfig,
    timeline::{self, CuePoint},
    visual, AudioBuffer, Result,
};

/// Unrounded output of every analysis stage for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFeatures {
    pub duration_seconds: f64,
    pub bpm: f32,
    pub key: KeyEstimate,
    pub loudness_lufs: f32,
    pub spectral: SpectralShape,
    pub waveform_envelope: Vec<f32>,
    pub frequency_spectrum: Vec<f32>,
    pub cue_points: Vec<CuePoint>,
}

/// Runs the tempo, key, loudness, spectral, visual and segmentation stages in
/// sequence.
pub struct AnalysisEngine {
    config: AnalyzerConfig,
}

impl AnalysisEngine {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, buffer: &AudioBuffer) -> Result<TrackFeatures> {
        let config = &self.config;
        let spectrogram = Spectrogram::compute(
            buffer.samples(),
            buffer.sample_rate(),
            config.stft.frame_size,
            config.stft.hop_size,
        )?;

        let bpm = tempo::estimate_bpm(&spectrogram, &config.tempo);
        progress(30);

        let key = key::detect_key(buffer, &config.key)?;
        progress(45);

        let loudness_lufs = loudness::integrated_loudness(buffer, &config.loudness);
        progress(60);

        let spectral = spectral::analyze(&spectrogram, &config.spectral);
        progress(75);

        let waveform_envelope = visual::waveform_envelope(buffer.samples(), &config.visual);
        let frequency_spectrum = visual::frequency_spectrum(&spectrogram, &config.visual);
        progress(85);

        let boundaries = if config.segment.hop_size == config.stft.hop_size {
            segment::detect_boundaries(&spectrogram, &config.segment)
        } else {
            let segment_spectrogram = Spectrogram::compute(
                buffer.samples(),
                buffer.sample_rate(),
                config.stft.frame_size,
                config.segment.hop_size,
            )?;
            segment::detect_boundaries(&segment_spectrogram, &config.segment)
        };
        let cue_points = timeline::label_boundaries(&boundaries, config.segment.max_cue_points);

        tracing::debug!(
            bpm,
            key = %key.label(),
            loudness_lufs,
            cue_points = cue_points.len(),
            "analysis stages complete"
        );

        Ok(TrackFeatures {
            duration_seconds: buffer.duration_seconds(),
            bpm,
            key,
            loudness_lufs,
            spectral,
            waveform_envelope,
            frequency_spectrum,
            cue_points,
        })
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("frame_size", &self.config.stft.frame_size)
            .field("hop_size", &self.config.stft.hop_size)
            .field("segment_hop_size", &self.config.segment.hop_size)
            .finish()
    }
}

/// Tracing target of the progress lines. Subscribers should keep it enabled
/// at `info` whatever else they filter.
pub const PROGRESS_TARGET: &str = "track_analyzer::progress";

/// Emits a `Progress: N%` line. Callers outside the crate scrape this text.
pub(crate) fn progress(percent: u8) {
    tracing::info!(target: PROGRESS_TARGET, "Progress: {percent}%");
}
