//! Integrated programme loudness (ITU-R BS.1770 / EBU R128 style).
//!
//! Algorithm:
//! 1. K-weight the signal (high-shelf pre-filter, then RLB high-pass)
//! 2. Mean square over overlapping 400 ms gating blocks
//! 3. Drop blocks under the absolute gate (-70 LUFS)
//! 4. Drop blocks more than 10 LU under the mean of the survivors
//! 5. Integrate what is left

use std::f64::consts::PI;

use crate::{config::LoudnessConfig, AudioBuffer};

const LOUDNESS_OFFSET: f64 = -0.691;

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b0: b[0],
            b1: b[1],
            b2: b[2],
            a1: a[0],
            a2: a[1],
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Stage 1: high shelf modelling the acoustic effect of the head.
    fn pre_filter(sample_rate: f64) -> Self {
        let f0 = 1_681.974_450_955_533;
        let gain_db = 3.999_843_853_973_347;
        let q = 0.707_175_236_955_419_6;

        let k = (PI * f0 / sample_rate).tan();
        let vh = 10f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.499_666_774_154_541_6);
        let a0 = 1.0 + k / q + k * k;

        Self::new(
            [
                (vh + vb * k / q + k * k) / a0,
                2.0 * (k * k - vh) / a0,
                (vh - vb * k / q + k * k) / a0,
            ],
            [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        )
    }

    /// Stage 2: revised low-frequency B-curve high-pass.
    fn rlb_filter(sample_rate: f64) -> Self {
        let f0 = 38.135_470_876_024_44;
        let q = 0.500_327_037_323_877_3;

        let k = (PI * f0 / sample_rate).tan();
        let a0 = 1.0 + k / q + k * k;

        Self::new(
            [1.0, -2.0, 1.0],
            [2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        )
    }

    fn process(&mut self, input: f64) -> f64 {
        let output = input * self.b0 + self.z1;
        self.z1 = input * self.b1 + self.z2 - self.a1 * output;
        self.z2 = input * self.b2 - self.a2 * output;
        output
    }
}

/// Integrated loudness in LUFS. Buffers shorter than one gating block, or
/// whose blocks are all gated out, report `config.floor_lufs`.
pub fn integrated_loudness(buffer: &AudioBuffer, config: &LoudnessConfig) -> f32 {
    let sample_rate = buffer.sample_rate() as f64;
    let block = (sample_rate * config.block_ms as f64 / 1000.0).round() as usize;
    let step = ((block as f64) * (1.0 - config.overlap as f64)).round().max(1.0) as usize;

    if block == 0 || buffer.len() < block {
        tracing::debug!(
            samples = buffer.len(),
            block,
            "buffer shorter than one gating block"
        );
        return config.floor_lufs;
    }

    let mut pre = Biquad::pre_filter(sample_rate);
    let mut rlb = Biquad::rlb_filter(sample_rate);
    let squared: Vec<f64> = buffer
        .samples()
        .iter()
        .map(|&sample| {
            let weighted = rlb.process(pre.process(sample as f64));
            weighted * weighted
        })
        .collect();

    // Prefix sums turn every block mean into two lookups.
    let mut prefix = Vec::with_capacity(squared.len() + 1);
    prefix.push(0.0f64);
    for value in &squared {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + value);
    }

    let blocks: Vec<f64> = (0..=(squared.len() - block) / step)
        .map(|index| {
            let start = index * step;
            (prefix[start + block] - prefix[start]) / block as f64
        })
        .collect();

    let absolute: Vec<f64> = blocks
        .into_iter()
        .filter(|&power| block_loudness(power) > config.absolute_gate_lufs as f64)
        .collect();
    if absolute.is_empty() {
        return config.floor_lufs;
    }

    let relative_gate = block_loudness(mean(&absolute)) + config.relative_gate_lu as f64;
    let gated: Vec<f64> = absolute
        .into_iter()
        .filter(|&power| block_loudness(power) > relative_gate)
        .collect();
    if gated.is_empty() {
        return config.floor_lufs;
    }

    let lufs = block_loudness(mean(&gated)) as f32;
    tracing::debug!(lufs, blocks = gated.len(), "integrated loudness");
    lufs
}

fn block_loudness(mean_square: f64) -> f64 {
    if mean_square <= 0.0 {
        f64::NEG_INFINITY
    } else {
        LOUDNESS_OFFSET + 10.0 * mean_square.log10()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
