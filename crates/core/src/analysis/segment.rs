//! Structural boundary detection.
//!
//! Frames are summarised as log-compressed octave band energies and averaged
//! into coarse blocks. A Gaussian-tapered checkerboard kernel slid along the
//! diagonal of the blocks' cosine self-similarity matrix gives a novelty
//! curve (Foote, 2000) whose prominent peaks become section boundaries.

use std::cmp::Ordering;

use crate::{analysis::stft::Spectrogram, config::SegmentConfig};

/// Novelty below this is rounding noise from the balanced kernel.
const MIN_NOVELTY: f32 = 1e-3;

/// Boundary times in seconds, ascending, always starting with the track
/// start at `0.0`.
pub fn detect_boundaries(spectrogram: &Spectrogram, config: &SegmentConfig) -> Vec<f64> {
    let block_frames = frames_per_block(
        config.block_seconds,
        spectrogram.sample_rate(),
        spectrogram.hop_size(),
    );
    let blocks = block_features(spectrogram, block_frames);
    let novelty = novelty_curve(&blocks, config.kernel_blocks);
    let peaks = pick_peaks(&novelty, config);

    let block_seconds =
        (block_frames * spectrogram.hop_size()) as f64 / spectrogram.sample_rate() as f64;

    let mut boundaries = Vec::with_capacity(peaks.len() + 1);
    boundaries.push(0.0);
    boundaries.extend(peaks.into_iter().map(|index| index as f64 * block_seconds));

    tracing::debug!(
        blocks = blocks.len(),
        boundaries = boundaries.len(),
        "structural boundaries"
    );
    boundaries
}

/// Number of STFT frames closest to `block_seconds`, at least one.
fn frames_per_block(block_seconds: f32, sample_rate: u32, hop_size: usize) -> usize {
    let frames = block_seconds as f64 * sample_rate as f64 / hop_size.max(1) as f64;
    (frames.round() as usize).max(1)
}

/// Unit-length block descriptors; all-zero blocks stay zero.
fn block_features(spectrogram: &Spectrogram, block_frames: usize) -> Vec<Vec<f32>> {
    let bands = octave_bins(spectrogram.num_bins());

    spectrogram
        .frames()
        .chunks(block_frames)
        .map(|chunk| {
            let mut block = vec![0.0f32; bands.len()];
            for frame in chunk {
                for (value, &(start, end)) in block.iter_mut().zip(&bands) {
                    let energy: f32 = frame[start..end].iter().sum();
                    *value += energy.ln_1p();
                }
            }

            let norm = block.iter().map(|value| value * value).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                block.iter_mut().for_each(|value| *value /= norm);
            }
            block
        })
        .collect()
}

/// Bin ranges `[1, 2), [2, 4), [4, 8), ...` up to the last bin. DC is skipped.
/// A truncated top band is folded into the one below it.
fn octave_bins(num_bins: usize) -> Vec<(usize, usize)> {
    let mut bands: Vec<(usize, usize)> = Vec::new();
    let mut start = 1;
    while start < num_bins {
        let end = (start * 2).min(num_bins);
        match bands.last_mut() {
            Some(previous) if end - start < start => previous.1 = end,
            _ => bands.push((start, end)),
        }
        start = end;
    }
    bands
}

fn similarity(a: &[f32], b: &[f32]) -> f32 {
    let a_zero = a.iter().all(|value| *value == 0.0);
    let b_zero = b.iter().all(|value| *value == 0.0);
    match (a_zero, b_zero) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => a.iter().zip(b).map(|(x, y)| x * y).sum(),
    }
}

/// Novelty per block. Only positions where the kernel fits entirely are
/// scored; the rest stay at zero.
fn novelty_curve(blocks: &[Vec<f32>], half_width: usize) -> Vec<f32> {
    let count = blocks.len();
    let mut novelty = vec![0.0f32; count];
    if half_width == 0 || count < 2 * half_width + 1 {
        return novelty;
    }

    let kernel = checkerboard_kernel(half_width);
    let width = 2 * half_width;

    for (centre, slot) in novelty
        .iter_mut()
        .enumerate()
        .take(count - half_width + 1)
        .skip(half_width)
    {
        let origin = centre - half_width;
        let mut score = 0.0f32;
        for a in 0..width {
            for b in 0..width {
                score += kernel[a * width + b]
                    * similarity(&blocks[origin + a], &blocks[origin + b]);
            }
        }
        *slot = score.max(0.0);
    }

    novelty
}

/// `2L x 2L` kernel, positive on the within-segment quadrants and negative on
/// the cross quadrants, tapered by a Gaussian.
fn checkerboard_kernel(half_width: usize) -> Vec<f32> {
    let width = 2 * half_width;
    let sigma = 0.5f32;
    let mut kernel = Vec::with_capacity(width * width);

    for a in 0..width {
        for b in 0..width {
            let x = (a as f32 - half_width as f32 + 0.5) / half_width as f32;
            let y = (b as f32 - half_width as f32 + 0.5) / half_width as f32;
            let sign = if (x < 0.0) == (y < 0.0) { 1.0 } else { -1.0 };
            kernel.push(sign * (-(x * x + y * y) / (2.0 * sigma * sigma)).exp());
        }
    }

    kernel
}

/// Local maxima above `median + k * MAD` (and above a fraction of the global
/// maximum), at least one kernel width apart, in ascending index order.
fn pick_peaks(novelty: &[f32], config: &SegmentConfig) -> Vec<usize> {
    if novelty.len() < 3 {
        return Vec::new();
    }

    let max_value = novelty.iter().copied().fold(0.0f32, f32::max);
    if max_value <= MIN_NOVELTY {
        return Vec::new();
    }

    let centre = median(novelty);
    let deviations: Vec<f32> = novelty.iter().map(|value| (value - centre).abs()).collect();
    let threshold = (centre + config.threshold_mad * median(&deviations))
        .max(config.min_peak_ratio * max_value)
        .max(MIN_NOVELTY);

    let mut candidates: Vec<(usize, f32)> = (1..novelty.len() - 1)
        .filter(|&i| {
            let value = novelty[i];
            value > novelty[i - 1] && value >= novelty[i + 1] && value >= threshold
        })
        .map(|i| (i, novelty[i]))
        .collect();

    // Strongest first so that close neighbours yield to the dominant peak.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let min_distance = config.kernel_blocks.max(1);
    let mut kept: Vec<usize> = Vec::new();
    for (index, _) in candidates {
        if kept.iter().all(|&other| index.abs_diff(other) >= min_distance) {
            kept.push(index);
        }
    }

    kept.sort_unstable();
    kept
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}
