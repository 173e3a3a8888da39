//! Soft-knee dynamics compressor.

use serde::{Deserialize, Serialize};

use super::level::{db_to_linear, linear_to_db};

/// Fraction of the full-scale gain reduction given back as makeup gain.
const MAKEUP_EXPONENT: f32 = 0.6;

/// Compressor parameters as seen by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
}

impl CompressorSettings {
    pub fn new(
        threshold_db: f32,
        knee_db: f32,
        ratio: f32,
        attack_seconds: f32,
        release_seconds: f32,
    ) -> Self {
        Self {
            threshold_db,
            knee_db,
            ratio,
            attack_seconds,
            release_seconds,
        }
    }
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack_seconds: 0.003,
            release_seconds: 0.25,
        }
    }
}

/// Runtime state: smoothed gain reduction shared by all channels.
#[derive(Clone, Debug)]
pub struct CompressorState {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain_db: f32,
    current_gain_db: f32,
}

impl CompressorState {
    pub fn new(settings: &CompressorSettings, sample_rate: u32) -> Self {
        let threshold_db = sanitize_threshold_db(settings.threshold_db);
        let knee_db = sanitize_knee_db(settings.knee_db);
        let ratio = sanitize_ratio(settings.ratio);
        let full_scale_gain_db = compute_gain_db(0.0, threshold_db, knee_db, ratio);
        Self {
            threshold_db,
            knee_db,
            ratio,
            attack_coeff: time_to_coeff(settings.attack_seconds, sample_rate),
            release_coeff: time_to_coeff(settings.release_seconds, sample_rate),
            makeup_gain_db: -MAKEUP_EXPONENT * full_scale_gain_db,
            current_gain_db: 0.0,
        }
    }

    /// Compress a planar block; level detection uses the per-frame peak.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let frames = input.first().map(Vec::len).unwrap_or(0);
        let mut output: Vec<Vec<f32>> = input.iter().map(|_| Vec::with_capacity(frames)).collect();

        for frame in 0..frames {
            let peak = input
                .iter()
                .fold(0.0_f32, |peak, channel| peak.max(channel[frame].abs()));

            let level_db = linear_to_db(peak);
            let target_gain_db =
                compute_gain_db(level_db, self.threshold_db, self.knee_db, self.ratio);
            self.update_gain(target_gain_db);
            let gain = db_to_linear(self.current_gain_db + self.makeup_gain_db);

            for (out, channel) in output.iter_mut().zip(input) {
                out.push(channel[frame] * gain);
            }
        }

        output
    }

    fn update_gain(&mut self, target_gain_db: f32) {
        let coeff = if target_gain_db < self.current_gain_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.current_gain_db = coeff * self.current_gain_db + (1.0 - coeff) * target_gain_db;
    }
}

/// Static gain curve in dB, quadratic through the knee.
fn compute_gain_db(level_db: f32, threshold_db: f32, knee_db: f32, ratio: f32) -> f32 {
    let overshoot = level_db - threshold_db;
    let slope = 1.0 / ratio - 1.0;

    if knee_db > 0.0 && 2.0 * overshoot.abs() <= knee_db {
        let x = overshoot + knee_db / 2.0;
        slope * x * x / (2.0 * knee_db)
    } else if overshoot > 0.0 {
        slope * overshoot
    } else {
        0.0
    }
}

fn time_to_coeff(seconds: f32, sample_rate: u32) -> f32 {
    if seconds <= 0.0 || !seconds.is_finite() || sample_rate == 0 {
        return 0.0;
    }
    (-1.0 / (seconds * sample_rate as f32)).exp()
}

fn sanitize_threshold_db(threshold_db: f32) -> f32 {
    if !threshold_db.is_finite() {
        return -24.0;
    }
    threshold_db.clamp(-100.0, 0.0)
}

fn sanitize_knee_db(knee_db: f32) -> f32 {
    if !knee_db.is_finite() {
        return 0.0;
    }
    knee_db.clamp(0.0, 40.0)
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if !ratio.is_finite() {
        return 1.0;
    }
    ratio.clamp(1.0, 20.0)
}
