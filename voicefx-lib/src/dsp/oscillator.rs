//! Phase-accumulating periodic oscillator.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Value at `phase` in cycles, `[0, 1)`.
    pub fn sample(self, phase: f64) -> f32 {
        let value = match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        };
        value as f32
    }
}

/// Mono oscillator whose phase carries across blocks.
#[derive(Clone, Debug)]
pub struct OscillatorState {
    waveform: Waveform,
    increment: f64,
    phase: f64,
}

impl OscillatorState {
    pub fn new(frequency_hz: f32, waveform: Waveform, sample_rate: u32) -> Self {
        let increment = if sample_rate == 0 || !frequency_hz.is_finite() {
            0.0
        } else {
            frequency_hz as f64 / sample_rate as f64
        };
        Self {
            waveform,
            increment,
            phase: 0.0,
        }
    }

    /// Produce the next `frames` samples.
    pub fn process(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames);
        for _ in 0..frames {
            out.push(self.waveform.sample(self.phase));
            self.phase = (self.phase + self.increment).rem_euclid(1.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero_and_peaks_at_quarter_cycle() {
        let mut osc = OscillatorState::new(1.0, Waveform::Sine, 4);
        let out = osc.process(4);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
        assert!((out[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn phase_continues_across_blocks() {
        let mut whole = OscillatorState::new(30.0, Waveform::Sine, 44_100);
        let mut split = OscillatorState::new(30.0, Waveform::Sine, 44_100);
        let expected = whole.process(2_000);
        let mut actual = split.process(777);
        actual.extend(split.process(1_223));
        assert_eq!(expected, actual);
    }

    #[test]
    fn other_waveforms_stay_in_range() {
        for waveform in [Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            let mut osc = OscillatorState::new(440.0, waveform, 44_100);
            assert!(osc.process(1_000).iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }
}
