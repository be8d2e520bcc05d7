//! Tempo estimation from an onset-strength envelope.
//!
//! The envelope is the half-wave rectified spectral flux of log-compressed
//! magnitudes. Its autocorrelation is weighted by a log-normal prior over
//! tempo and the strongest lag wins. Everything is deterministic for a fixed
//! input.

use crate::{analysis::stft::Spectrogram, config::TempoConfig};

const LOG_COMPRESSION: f32 = 100.0;
const EPSILON: f32 = 1e-10;

/// Per-frame onset strength, one value per STFT hop.
pub fn onset_envelope(spectrogram: &Spectrogram) -> Vec<f32> {
    let frames = spectrogram.frames();
    let mut envelope = Vec::with_capacity(frames.len());
    let mut previous: Option<Vec<f32>> = None;

    for frame in frames {
        let current: Vec<f32> = frame
            .iter()
            .map(|magnitude| (1.0 + LOG_COMPRESSION * magnitude).ln())
            .collect();

        let flux = match &previous {
            Some(previous) => {
                let rise: f32 = current
                    .iter()
                    .zip(previous)
                    .map(|(now, before)| (now - before).max(0.0))
                    .sum();
                rise / current.len().max(1) as f32
            }
            None => 0.0,
        };

        envelope.push(flux);
        previous = Some(current);
    }

    envelope
}

/// Returns the dominant tempo in BPM, or `0.0` when the envelope carries no
/// periodicity (silence, too few frames).
pub fn estimate_bpm(spectrogram: &Spectrogram, config: &TempoConfig) -> f32 {
    let frame_rate = spectrogram.sample_rate() as f32 / spectrogram.hop_size() as f32;
    estimate_from_envelope(&onset_envelope(spectrogram), frame_rate, config)
}

pub fn estimate_from_envelope(envelope: &[f32], frame_rate: f32, config: &TempoConfig) -> f32 {
    if envelope.len() < 4 || frame_rate <= 0.0 {
        return 0.0;
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centred: Vec<f32> = envelope.iter().map(|value| value - mean).collect();
    let energy: f32 = centred.iter().map(|value| value * value).sum();
    if energy <= EPSILON {
        return 0.0;
    }

    let min_lag = ((frame_rate * 60.0 / config.max_bpm).floor() as usize).max(1);
    let max_lag = ((frame_rate * 60.0 / config.min_bpm).ceil() as usize).min(centred.len() - 1);
    if min_lag >= max_lag {
        return 0.0;
    }

    let score = |lag: usize| -> f32 {
        let correlation: f32 = centred
            .iter()
            .zip(&centred[lag..])
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / energy;
        correlation * tempo_prior(60.0 * frame_rate / lag as f32, config)
    };

    let scores: Vec<f32> = (min_lag..=max_lag).map(score).collect();
    let Some((best, &best_score)) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return 0.0;
    };
    if best_score <= 0.0 {
        return 0.0;
    }

    let mut lag = (min_lag + best) as f32;
    if best > 0 && best + 1 < scores.len() {
        let (left, right) = (scores[best - 1], scores[best + 1]);
        let curvature = left - 2.0 * best_score + right;
        if curvature.abs() > EPSILON {
            lag += (0.5 * (left - right) / curvature).clamp(-0.5, 0.5);
        }
    }

    let bpm = 60.0 * frame_rate / lag;
    tracing::debug!(bpm, lag, "tempo estimate");
    bpm
}

fn tempo_prior(bpm: f32, config: &TempoConfig) -> f32 {
    let octaves = (bpm / config.prior_bpm).log2() / config.prior_octaves.max(EPSILON);
    (-0.5 * octaves * octaves).exp()
}
