//! Index-based reductions that turn raw analysis output into fixed-size
//! arrays for UI rendering.

use crate::{analysis::stft::Spectrogram, config::VisualConfig};

/// Keeps every `len / limit`-th element when `values` is longer than `limit`,
/// truncated to `limit` elements. Shorter inputs are returned whole.
pub fn every_kth<T: Clone>(values: &[T], limit: usize) -> Vec<T> {
    if limit == 0 {
        return Vec::new();
    }
    if values.len() <= limit {
        return values.to_vec();
    }

    let step = values.len() / limit;
    values.iter().step_by(step).take(limit).cloned().collect()
}

/// Absolute sample values, subsampled to at most `config.envelope_points`.
pub fn waveform_envelope(samples: &[f32], config: &VisualConfig) -> Vec<f32> {
    every_kth(samples, config.envelope_points)
        .into_iter()
        .map(f32::abs)
        .collect()
}

/// Time-averaged magnitude per frequency bin, subsampled to at most
/// `config.spectrum_bins`.
pub fn frequency_spectrum(spectrogram: &Spectrogram, config: &VisualConfig) -> Vec<f32> {
    every_kth(&spectrogram.mean_spectrum(), config.spectrum_bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_inputs_are_kept_whole() {
        assert_eq!(every_kth(&[1, 2, 3], 10), vec![1, 2, 3]);
        assert_eq!(every_kth::<u8>(&[], 10), Vec::<u8>::new());
    }

    #[test]
    fn long_inputs_take_every_kth_and_truncate() {
        let values: Vec<usize> = (0..25).collect();
        // step = 25 / 10 = 2 -> 0, 2, 4, ... truncated to 10 entries
        assert_eq!(every_kth(&values, 10), vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);

        let values: Vec<usize> = (0..19).collect();
        // step = 1, so the first ten are kept
        assert_eq!(every_kth(&values, 10), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn envelope_of_short_buffer_is_elementwise_abs() {
        let samples = [0.5, -0.25, 0.0, -1.0];
        let envelope = waveform_envelope(&samples, &VisualConfig::default());
        assert_eq!(envelope, vec![0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn envelope_never_exceeds_limit() {
        let config = VisualConfig::default();
        for len in [999, 1_000, 1_001, 1_999, 2_000, 44_100 * 3 + 7] {
            let samples: Vec<f32> = (0..len).map(|i| -(i as f32)).collect();
            let envelope = waveform_envelope(&samples, &config);
            assert!(envelope.len() <= 1_000, "{len} -> {}", envelope.len());
            assert_eq!(envelope.len(), len.min(1_000));
            assert!(envelope.iter().all(|value| *value >= 0.0));
        }
    }

    #[test]
    fn envelope_samples_are_evenly_spaced() {
        let samples: Vec<f32> = (0..5_000).map(|i| i as f32).collect();
        let envelope = waveform_envelope(&samples, &VisualConfig::default());
        assert_eq!(envelope[0], 0.0);
        assert_eq!(envelope[1], 5.0);
        assert_eq!(envelope[999], 4_995.0);
    }

    #[test]
    fn spectrum_is_capped_at_one_hundred_bins() {
        let samples: Vec<f32> = (0..8_192).map(|i| ((i * 7) % 13) as f32 / 13.0).collect();
        let spec = Spectrogram::compute(&samples, 44_100, 2048, 512).unwrap();
        let spectrum = frequency_spectrum(&spec, &VisualConfig::default());
        assert_eq!(spec.num_bins(), 1_025);
        assert_eq!(spectrum.len(), 100);

        let mean = spec.mean_spectrum();
        assert_eq!(spectrum[1], mean[10]);
    }

    #[test]
    fn reductions_are_reproducible() {
        let samples: Vec<f32> = (0..30_000).map(|i| (i as f32 * 0.01).sin()).collect();
        let config = VisualConfig::default();
        assert_eq!(
            waveform_envelope(&samples, &config),
            waveform_envelope(&samples, &config)
        );
    }
}
