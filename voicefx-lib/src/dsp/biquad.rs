//! Second-order IIR filters (RBJ cookbook, bilinear transform).

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Resonance used when a graph does not specify one: 1 dB, as linear Q.
pub const DEFAULT_Q: f32 = 1.122_018_5;

/// Filter response shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    LowPass,
    HighPass,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// Per-channel filter memory for a fixed set of coefficients.
#[derive(Clone, Debug)]
pub struct BiquadState {
    coeffs: BiquadCoefficients,
    x_n1: Vec<f32>,
    x_n2: Vec<f32>,
    y_n1: Vec<f32>,
    y_n2: Vec<f32>,
}

impl BiquadState {
    pub fn new(kind: FilterKind, sample_rate: u32, cutoff_hz: f32, q: f32) -> Self {
        let cutoff_hz = sanitize_freq(cutoff_hz, sample_rate);
        let q = sanitize_q(q);
        Self {
            coeffs: coefficients(kind, sample_rate, cutoff_hz, q),
            x_n1: Vec::new(),
            x_n2: Vec::new(),
            y_n1: Vec::new(),
            y_n2: Vec::new(),
        }
    }

    /// Filter a planar block; channel memory is allocated on first use.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Vec<Vec<f32>> {
        self.ensure_channels(input.len());

        let c = self.coeffs;
        input
            .iter()
            .enumerate()
            .map(|(ch, samples)| {
                let mut out = Vec::with_capacity(samples.len());
                for &sample in samples {
                    let result = c.b0 * sample + c.b1 * self.x_n1[ch] + c.b2 * self.x_n2[ch]
                        - c.a1 * self.y_n1[ch]
                        - c.a2 * self.y_n2[ch];

                    self.x_n2[ch] = self.x_n1[ch];
                    self.x_n1[ch] = sample;
                    self.y_n2[ch] = self.y_n1[ch];
                    self.y_n1[ch] = result;

                    out.push(result);
                }
                out
            })
            .collect()
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.x_n1.len() < channels {
            self.x_n1.resize(channels, 0.0);
            self.x_n2.resize(channels, 0.0);
            self.y_n1.resize(channels, 0.0);
            self.y_n2.resize(channels, 0.0);
        }
    }
}

fn sanitize_freq(freq: f32, sample_rate: u32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    if !freq.is_finite() || nyquist <= 1.0 {
        return 1.0;
    }
    freq.clamp(1.0, nyquist - 1.0)
}

fn sanitize_q(q: f32) -> f32 {
    if !q.is_finite() {
        return DEFAULT_Q;
    }
    q.clamp(0.1, 10.0)
}

fn coefficients(kind: FilterKind, sample_rate: u32, freq: f32, q: f32) -> BiquadCoefficients {
    let w0 = 2.0 * PI * freq / sample_rate as f32;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * q);
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;

    let (b0, b1, b2) = match kind {
        FilterKind::LowPass => {
            let b1 = 1.0 - cos_w0;
            (b1 / 2.0, b1, b1 / 2.0)
        }
        FilterKind::HighPass => {
            let b0 = (1.0 + cos_w0) / 2.0;
            (b0, -1.0 - cos_w0, b0)
        }
    };

    BiquadCoefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut state = BiquadState::new(FilterKind::HighPass, 44_100, 200.0, DEFAULT_Q);
        let out = state.process(&[vec![1.0; 44_100]]);
        assert!(out[0][44_099].abs() < 1e-3);
    }

    #[test]
    fn high_pass_attenuates_below_cutoff() {
        let mut low = BiquadState::new(FilterKind::HighPass, 44_100, 300.0, DEFAULT_Q);
        let mut high = BiquadState::new(FilterKind::HighPass, 44_100, 300.0, DEFAULT_Q);
        let low_out = low.process(&[sine(50.0, 44_100, 8_820)]);
        let high_out = high.process(&[sine(3_000.0, 44_100, 8_820)]);
        assert!(rms(&low_out[0][4_410..]) < 0.1);
        assert!(rms(&high_out[0][4_410..]) > 0.6);
    }

    #[test]
    fn block_boundaries_do_not_change_output() {
        let input = sine(440.0, 48_000, 1_000);
        let mut whole = BiquadState::new(FilterKind::LowPass, 48_000, 1_000.0, DEFAULT_Q);
        let mut split = BiquadState::new(FilterKind::LowPass, 48_000, 1_000.0, DEFAULT_Q);

        let expected = whole.process(&[input.clone()]);
        let mut actual = split.process(&[input[..300].to_vec()]);
        actual[0].extend(split.process(&[input[300..].to_vec()])[0].iter());
        assert_eq!(expected, actual);
    }

    #[test]
    fn channels_keep_separate_memory() {
        let mut state = BiquadState::new(FilterKind::HighPass, 44_100, 200.0, DEFAULT_Q);
        let out = state.process(&[vec![1.0; 64], vec![0.0; 64]]);
        assert!(out[1].iter().all(|s| *s == 0.0));
        assert!(out[0][0] > 0.0);
    }
}
