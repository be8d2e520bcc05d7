//! Key detection by chroma / key-profile correlation.
//!
//! Power spectra are folded onto the twelve pitch classes (equal temperament,
//! A4 = 440 Hz), and the resulting distribution is correlated against the
//! Krumhansl-Schmuckler profiles rotated to every tonic.

use std::fmt;

use crate::{analysis::stft::Spectrogram, config::KeyConfig, AudioBuffer, Result};

pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

const KS_MAJOR: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

const KS_MINOR: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    /// Only the exact name `"major"` is major; every other value reads as minor.
    pub fn from_name(name: &str) -> Self {
        if name == "major" {
            Scale::Major
        } else {
            Scale::Minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    /// Pitch class of the tonic, 0 = C.
    pub tonic: usize,
    pub scale: Scale,
    /// Correlation of the winning profile, clamped to [0, 1].
    pub strength: f32,
}

impl KeyEstimate {
    pub fn tonic_name(&self) -> &'static str {
        PITCH_CLASSES[self.tonic % 12]
    }

    /// `"<PitchClass> major"` or `"<PitchClass> minor"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.tonic_name(), self.scale)
    }
}

pub fn detect_key(buffer: &AudioBuffer, config: &KeyConfig) -> Result<KeyEstimate> {
    let spectrogram = Spectrogram::compute_power(
        buffer.samples(),
        buffer.sample_rate(),
        config.frame_size,
        config.hop_size,
    )?;
    let chroma = chromagram(&spectrogram, config);
    let estimate = match_profiles(&chroma);

    tracing::debug!(
        key = %estimate.label(),
        strength = estimate.strength,
        "key estimate"
    );
    Ok(estimate)
}

/// Normalised pitch-class energy distribution (sums to 1, or all zeros for
/// silence).
pub fn chromagram(spectrogram: &Spectrogram, config: &KeyConfig) -> [f32; 12] {
    let bin_to_class: Vec<Option<usize>> = (0..spectrogram.num_bins())
        .map(|bin| pitch_class_of(spectrogram.bin_frequency(bin), config))
        .collect();

    let mut chroma = [0.0f64; 12];
    for frame in spectrogram.frames() {
        for (power, class) in frame.iter().zip(&bin_to_class) {
            if let Some(class) = class {
                chroma[*class] += *power as f64;
            }
        }
    }

    let total: f64 = chroma.iter().sum();
    let mut normalised = [0.0f32; 12];
    if total > 0.0 {
        for (out, value) in normalised.iter_mut().zip(chroma) {
            *out = (value / total) as f32;
        }
    }
    normalised
}

fn pitch_class_of(frequency: f32, config: &KeyConfig) -> Option<usize> {
    if frequency < config.min_frequency || frequency > config.max_frequency {
        return None;
    }
    let semitones_from_a = 12.0 * (frequency / 440.0).log2();
    let class = (semitones_from_a.round() as i32 + 9).rem_euclid(12);
    Some(class as usize)
}

/// Best of the 24 rotated profiles. Ties keep the first candidate, so a flat
/// chromagram resolves to C major with zero strength.
pub fn match_profiles(chroma: &[f32; 12]) -> KeyEstimate {
    let mut best = KeyEstimate {
        tonic: 0,
        scale: Scale::Major,
        strength: 0.0,
    };
    let mut best_correlation = f32::NEG_INFINITY;

    for tonic in 0..12 {
        for (profile, scale) in [(&KS_MAJOR, Scale::Major), (&KS_MINOR, Scale::Minor)] {
            let correlation = pearson_rotated(chroma, profile, tonic);
            if correlation > best_correlation {
                best_correlation = correlation;
                best = KeyEstimate {
                    tonic,
                    scale,
                    strength: correlation.clamp(0.0, 1.0),
                };
            }
        }
    }

    best
}

fn pearson_rotated(chroma: &[f32; 12], profile: &[f32; 12], tonic: usize) -> f32 {
    let n = 12.0f32;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2, mut sum_y2) = (0.0, 0.0, 0.0, 0.0, 0.0);

    for (i, &y) in profile.iter().enumerate() {
        let x = chroma[(tonic + i) % 12];
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
        sum_y2 += y * y;
    }

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt();
    if denominator < 1e-10 {
        0.0
    } else {
        numerator / denominator
    }
}
