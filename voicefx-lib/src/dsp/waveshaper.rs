//! Lookup-curve waveshaper with optional oversampling.

use std::f32::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Number of points in generated distortion curves.
pub const CURVE_LEN: usize = 44_100;

/// Oversampling applied around the curve lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Oversample {
    None,
    X2,
    X4,
}

impl Oversample {
    pub fn factor(self) -> usize {
        match self {
            Oversample::None => 1,
            Oversample::X2 => 2,
            Oversample::X4 => 4,
        }
    }
}

/// Soft-clipping curve `((3 + k)·x·20°) / (π + k·|x|)` sampled over `x ∈ [-1, 1)`.
pub fn distortion_curve(amount: f32, len: usize) -> Vec<f32> {
    let deg = PI / 180.0;
    (0..len)
        .map(|i| {
            let x = (i as f32 * 2.0) / len as f32 - 1.0;
            ((3.0 + amount) * x * 20.0 * deg) / (PI + amount * x.abs())
        })
        .collect()
}

/// Map one sample through `curve`, interpolating between points.
///
/// Inputs outside `[-1, 1]` take the curve's end values.
pub fn shape_sample(curve: &[f32], sample: f32) -> f32 {
    let Some(&last) = curve.last() else {
        return sample;
    };
    if curve.len() == 1 {
        return last;
    }

    let position = (curve.len() - 1) as f32 * 0.5 * (sample + 1.0);
    if !position.is_finite() || position <= 0.0 {
        return curve[0];
    }
    let index = position.floor() as usize;
    if index >= curve.len() - 1 {
        return last;
    }
    let frac = position - index as f32;
    curve[index] * (1.0 - frac) + curve[index + 1] * frac
}

/// Waveshaper runtime state: last input per channel for upsampling.
#[derive(Clone, Debug)]
pub struct WaveShaperState {
    curve: Arc<[f32]>,
    oversample: Oversample,
    previous: Vec<f32>,
}

impl WaveShaperState {
    pub fn new(curve: Arc<[f32]>, oversample: Oversample) -> Self {
        Self {
            curve,
            oversample,
            previous: Vec::new(),
        }
    }

    /// Shape a planar block.
    ///
    /// With oversampling, each input step is linearly upsampled, shaped, then
    /// averaged back down to one sample.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Vec<Vec<f32>> {
        if self.previous.len() < input.len() {
            self.previous.resize(input.len(), 0.0);
        }

        let factor = self.oversample.factor();
        input
            .iter()
            .enumerate()
            .map(|(ch, samples)| {
                let mut out = Vec::with_capacity(samples.len());
                for &sample in samples {
                    if factor == 1 {
                        out.push(shape_sample(&self.curve, sample));
                        continue;
                    }
                    let start = self.previous[ch];
                    let mut acc = 0.0;
                    for step in 1..=factor {
                        let t = step as f32 / factor as f32;
                        acc += shape_sample(&self.curve, start + (sample - start) * t);
                    }
                    out.push(acc / factor as f32);
                    self.previous[ch] = sample;
                }
                out
            })
            .collect()
    }
}
