use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AnalyzerError, Result};

/// Magnitude short-time spectrum: one row of `frame_size / 2 + 1` bins per
/// hop. Frames start at `index * hop_size`; the last one is zero-padded, and
/// a buffer shorter than a frame still yields one frame.
#[derive(Clone, PartialEq)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
}

impl Spectrogram {
    pub fn compute(
        samples: &[f32],
        sample_rate: u32,
        frame_size: usize,
        hop_size: usize,
    ) -> Result<Self> {
        Self::compute_with(samples, sample_rate, frame_size, hop_size, |spectrum, row| {
            for (out, bin) in row.iter_mut().zip(spectrum) {
                *out = bin.norm();
            }
        })
    }

    /// Same framing as [`Spectrogram::compute`] but stores power (`|X|²`).
    pub fn compute_power(
        samples: &[f32],
        sample_rate: u32,
        frame_size: usize,
        hop_size: usize,
    ) -> Result<Self> {
        Self::compute_with(samples, sample_rate, frame_size, hop_size, |spectrum, row| {
            for (out, bin) in row.iter_mut().zip(spectrum) {
                *out = bin.norm_sqr();
            }
        })
    }

    fn compute_with(
        samples: &[f32],
        sample_rate: u32,
        frame_size: usize,
        hop_size: usize,
        mut fill: impl FnMut(&[Complex32], &mut [f32]),
    ) -> Result<Self> {
        if frame_size < 2 || hop_size == 0 {
            return Err(AnalyzerError::InvalidInput(
                "stft requires a frame of at least two samples and a non-zero hop",
            ));
        }
        if sample_rate == 0 {
            return Err(AnalyzerError::InvalidInput("sample rate must be non-zero"));
        }

        let mut fft = FftResources::new(frame_size);
        let window: Vec<f32> = (0..frame_size).map(|i| hann_value(i, frame_size)).collect();
        let num_frames = frame_count(samples.len(), frame_size, hop_size);
        let mut frames = Vec::with_capacity(num_frames);

        for index in 0..num_frames {
            let start = index * hop_size;
            for (i, slot) in fft.input.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *slot = sample * window[i];
            }

            fft.plan
                .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
                .map_err(|err| AnalyzerError::analysis(format!("fft failed: {err}")))?;

            let mut row = vec![0.0; fft.spectrum.len()];
            fill(&fft.spectrum, &mut row);
            frames.push(row);
        }

        Ok(Self {
            frames,
            frame_size,
            hop_size,
            sample_rate,
        })
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Centre frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }

    /// Time-averaged value per frequency bin.
    pub fn mean_spectrum(&self) -> Vec<f32> {
        let mut mean = vec![0.0f32; self.num_bins()];
        if self.frames.is_empty() {
            return mean;
        }

        for frame in &self.frames {
            for (acc, value) in mean.iter_mut().zip(frame) {
                *acc += value;
            }
        }
        let scale = 1.0 / self.frames.len() as f32;
        mean.iter_mut().for_each(|value| *value *= scale);
        mean
    }
}

impl fmt::Debug for Spectrogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrogram")
            .field("frames", &self.frames.len())
            .field("frame_size", &self.frame_size)
            .field("hop_size", &self.hop_size)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if len <= frame_size {
        1
    } else {
        1 + (len - frame_size).div_ceil(hop_size)
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        Self {
            plan,
            scratch,
            spectrum,
            input,
        }
    }
}

pub(crate) fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * frequency as f64 * i as f64;
                (phase / sample_rate as f64).sin() as f32
            })
            .collect()
    }

    #[test]
    fn short_buffers_yield_a_single_padded_frame() {
        let spec = Spectrogram::compute(&[0.5; 100], 8_000, 256, 64).unwrap();
        assert_eq!(spec.num_frames(), 1);
        assert_eq!(spec.frames()[0].len(), 129);
    }

    #[test]
    fn frame_count_covers_the_tail() {
        assert_eq!(frame_count(1000, 256, 128), 1 + 6);
        assert_eq!(frame_count(256 + 128, 256, 128), 2);
        assert_eq!(frame_count(256 + 129, 256, 128), 3);
    }

    #[test]
    fn sine_energy_lands_in_the_expected_bin() {
        let sample_rate = 8_000;
        let spec = Spectrogram::compute(&sine(1_000.0, sample_rate, 4_096), sample_rate, 256, 128)
            .unwrap();
        let mean = spec.mean_spectrum();
        let (peak, _) = mean
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert!((spec.bin_frequency(peak) - 1_000.0).abs() <= 31.25);
    }

    #[test]
    fn power_is_magnitude_squared() {
        let samples = sine(440.0, 8_000, 1_024);
        let magnitude = Spectrogram::compute(&samples, 8_000, 512, 256).unwrap();
        let power = Spectrogram::compute_power(&samples, 8_000, 512, 256).unwrap();
        let m = magnitude.frames()[1][28];
        let p = power.frames()[1][28];
        assert!((m * m - p).abs() <= p.abs() * 1e-4 + 1e-6);
    }

    #[test]
    fn silence_has_zero_magnitude() {
        let spec = Spectrogram::compute(&[0.0; 2_048], 44_100, 512, 256).unwrap();
        assert!(spec.frames().iter().flatten().all(|value| *value == 0.0));
    }
}
