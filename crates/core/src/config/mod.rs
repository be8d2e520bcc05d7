use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AnalyzerError, Result};

/// Top-level configuration for the analysis pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub stft: StftConfig,
    pub tempo: TempoConfig,
    pub key: KeyConfig,
    pub loudness: LoudnessConfig,
    pub spectral: SpectralConfig,
    pub visual: VisualConfig,
    pub segment: SegmentConfig,
}

impl AnalyzerConfig {
    /// Parses a TOML document. Sections and fields that are absent keep their
    /// default values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            AnalyzerError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Rejects parameter combinations that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        check_window("stft", self.stft.frame_size, self.stft.hop_size)?;
        check_window("key", self.key.frame_size, self.key.hop_size)?;
        check_window("segment", self.stft.frame_size, self.segment.hop_size)?;

        if self.tempo.min_bpm <= 0.0 || self.tempo.min_bpm >= self.tempo.max_bpm {
            return Err(AnalyzerError::Config(format!(
                "tempo range {}..{} BPM is empty",
                self.tempo.min_bpm, self.tempo.max_bpm
            )));
        }
        if self.key.min_frequency <= 0.0 || self.key.min_frequency >= self.key.max_frequency {
            return Err(AnalyzerError::Config(
                "key chroma frequency range is empty".to_string(),
            ));
        }
        if self.loudness.block_ms <= 0.0 || !(0.0..1.0).contains(&self.loudness.overlap) {
            return Err(AnalyzerError::Config(
                "loudness block must be positive with overlap in [0, 1)".to_string(),
            ));
        }
        if self.spectral.bands == 0 || self.spectral.min_frequency <= 0.0 {
            return Err(AnalyzerError::Config(
                "spectral contrast needs at least one band above 0 Hz".to_string(),
            ));
        }
        if !(0.0..=0.5).contains(&self.spectral.quantile) {
            return Err(AnalyzerError::Config(
                "spectral contrast quantile must lie in [0, 0.5]".to_string(),
            ));
        }
        if self.visual.envelope_points == 0 || self.visual.spectrum_bins == 0 {
            return Err(AnalyzerError::Config(
                "visual reductions need a non-zero output size".to_string(),
            ));
        }
        let block_seconds = self.segment.block_seconds;
        if block_seconds.is_nan() || block_seconds <= 0.0 {
            return Err(AnalyzerError::Config(format!(
                "segment block length {block_seconds} s must be positive"
            )));
        }
        if self.segment.kernel_blocks == 0 || self.segment.max_cue_points == 0 {
            return Err(AnalyzerError::Config(
                "segment kernel and cue limits must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_window(section: &str, frame_size: usize, hop_size: usize) -> Result<()> {
    if frame_size < 2 || hop_size == 0 || hop_size > frame_size {
        return Err(AnalyzerError::Config(format!(
            "{section}: frame size {frame_size} / hop size {hop_size} is not a usable window"
        )));
    }
    Ok(())
}

/// Short-time Fourier transform shared by the tempo, spectral, visual and
/// segmentation stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StftConfig {
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Centre of the log-normal tempo prior.
    pub prior_bpm: f32,
    /// Width of the prior, in octaves.
    pub prior_octaves: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 30.0,
            max_bpm: 300.0,
            prior_bpm: 120.0,
            prior_octaves: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_frequency: f32,
    pub max_frequency: f32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 2048,
            min_frequency: 65.0,
            max_frequency: 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    pub block_ms: f32,
    /// Fraction of each gating block shared with the next one.
    pub overlap: f32,
    pub absolute_gate_lufs: f32,
    pub relative_gate_lu: f32,
    /// Value reported when nothing survives gating.
    pub floor_lufs: f32,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            block_ms: 400.0,
            overlap: 0.75,
            absolute_gate_lufs: -70.0,
            relative_gate_lu: -10.0,
            floor_lufs: -70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Number of octave bands above `min_frequency`; one extra band covers
    /// everything below it.
    pub bands: usize,
    pub min_frequency: f32,
    pub quantile: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            bands: 6,
            min_frequency: 200.0,
            quantile: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub envelope_points: usize,
    pub spectrum_bins: usize,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            envelope_points: 1000,
            spectrum_bins: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    pub hop_size: usize,
    /// Seconds of audio averaged into one self-similarity block. Rounded to
    /// whole STFT frames for the track's sample rate.
    pub block_seconds: f32,
    /// Half width of the checkerboard kernel, in blocks.
    pub kernel_blocks: usize,
    /// Multiplier on the median absolute deviation for novelty peaks.
    pub threshold_mad: f32,
    /// Peaks under this fraction of the strongest novelty value are ignored.
    pub min_peak_ratio: f32,
    pub max_cue_points: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            hop_size: 512,
            block_seconds: 0.5,
            kernel_blocks: 8,
            threshold_mad: 1.5,
            min_peak_ratio: 0.1,
            max_cue_points: 10,
        }
    }
}

/// One unit of work: which file to analyse and where to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub audio_path: PathBuf,
    pub track_id: String,
    pub job_id: String,
    pub store_url: String,
}

impl Invocation {
    pub fn new(
        audio_path: impl Into<PathBuf>,
        track_id: impl Into<String>,
        job_id: impl Into<String>,
        store_url: impl Into<String>,
    ) -> Self {
        Self {
            audio_path: audio_path.into(),
            track_id: track_id.into(),
            job_id: job_id.into(),
            store_url: store_url.into(),
        }
    }
}
