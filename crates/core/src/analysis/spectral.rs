use crate::{analysis::stft::Spectrogram, config::SpectralConfig};

const AMIN: f32 = 1e-10;

/// Time-averaged spectral shape descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralShape {
    /// Mean magnitude-weighted frequency in Hz.
    pub centroid: f32,
    /// Mean peak/valley difference in dB, one entry per band (lowest first).
    pub contrast: Vec<f32>,
}

pub fn analyze(spectrogram: &Spectrogram, config: &SpectralConfig) -> SpectralShape {
    let shape = SpectralShape {
        centroid: mean_centroid(spectrogram),
        contrast: mean_contrast(spectrogram, config),
    };
    tracing::debug!(
        centroid = shape.centroid,
        bands = shape.contrast.len(),
        "spectral shape"
    );
    shape
}

/// Frames without energy contribute a centroid of zero.
pub fn mean_centroid(spectrogram: &Spectrogram) -> f32 {
    if spectrogram.num_frames() == 0 {
        return 0.0;
    }

    let frequencies: Vec<f32> = (0..spectrogram.num_bins())
        .map(|bin| spectrogram.bin_frequency(bin))
        .collect();

    let total: f64 = spectrogram
        .frames()
        .iter()
        .map(|frame| {
            let mut magnitude_sum = 0.0f64;
            let mut weighted_sum = 0.0f64;
            for (magnitude, frequency) in frame.iter().zip(&frequencies) {
                magnitude_sum += *magnitude as f64;
                weighted_sum += (*magnitude * *frequency) as f64;
            }
            if magnitude_sum <= f64::EPSILON {
                0.0
            } else {
                weighted_sum / magnitude_sum
            }
        })
        .sum();

    (total / spectrogram.num_frames() as f64) as f32
}

/// Octave sub-band edges in Hz: `[0, f, 2f, 4f, ...]`, `bands + 1` bands in
/// total. The last band runs up to Nyquist.
pub fn band_edges(config: &SpectralConfig) -> Vec<f32> {
    let mut edges = Vec::with_capacity(config.bands + 2);
    edges.push(0.0);
    for octave in 0..=config.bands {
        edges.push(config.min_frequency * 2f32.powi(octave as i32));
    }
    edges
}

pub fn mean_contrast(spectrogram: &Spectrogram, config: &SpectralConfig) -> Vec<f32> {
    let edges = band_edges(config);
    let band_count = config.bands + 1;
    let nyquist = spectrogram.sample_rate() as f32 / 2.0;

    let bands: Vec<Vec<usize>> = (0..band_count)
        .map(|band| {
            let low = edges[band];
            let high = if band + 1 == band_count {
                f32::INFINITY
            } else {
                edges[band + 1]
            };
            if low >= nyquist {
                return Vec::new();
            }
            (0..spectrogram.num_bins())
                .filter(|&bin| {
                    let frequency = spectrogram.bin_frequency(bin);
                    frequency >= low && frequency < high
                })
                .collect()
        })
        .collect();

    let mut sums = vec![0.0f64; band_count];
    let mut sorted = Vec::new();
    for frame in spectrogram.frames() {
        for (sum, bins) in sums.iter_mut().zip(&bands) {
            if bins.is_empty() {
                continue;
            }
            sorted.clear();
            sorted.extend(bins.iter().map(|&bin| frame[bin]));
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let take = ((config.quantile * sorted.len() as f32).round() as usize)
                .clamp(1, sorted.len());
            let valley = sorted[..take].iter().sum::<f32>() / take as f32;
            let peak = sorted[sorted.len() - take..].iter().sum::<f32>() / take as f32;

            *sum += (power_to_db(peak) - power_to_db(valley)) as f64;
        }
    }

    let frames = spectrogram.num_frames().max(1) as f64;
    sums.into_iter().map(|sum| (sum / frames) as f32).collect()
}

fn power_to_db(value: f32) -> f32 {
    10.0 * value.max(AMIN).log10()
}
