use std::fmt::{self, Display};
use std::sync::Arc;

use crate::dsp::biquad::FilterKind;
use crate::dsp::compressor::CompressorSettings;
use crate::dsp::impulse_response::ImpulseResponse;
use crate::dsp::oscillator::Waveform;
use crate::dsp::waveshaper::Oversample;

/// A processing step in a [`super::SignalGraph`].
#[derive(Debug, Clone)]
pub enum SignalNode {
    /// Multiply by `value` plus any control input.
    Gain { value: f32 },
    /// Mono periodic signal; takes no audio input.
    Oscillator { frequency: f32, waveform: Waveform },
    BiquadFilter {
        kind: FilterKind,
        cutoff: f32,
        q: f32,
    },
    WaveShaper {
        curve: Arc<[f32]>,
        oversample: Oversample,
    },
    DynamicsCompressor(CompressorSettings),
    Convolver {
        impulse_response: Arc<ImpulseResponse>,
        normalize: bool,
    },
    /// Plays the graph input at `base_rate + lfo_depth·sin(2π·lfo_frequency·t)`
    /// plus any control input. The only node that reads the input buffer.
    PlaybackRateModulator {
        base_rate: f32,
        lfo_frequency: f32,
        lfo_depth: f32,
    },
}

impl SignalNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SignalNode::Gain { .. } => "gain",
            SignalNode::Oscillator { .. } => "oscillator",
            SignalNode::BiquadFilter { .. } => "biquad_filter",
            SignalNode::WaveShaper { .. } => "wave_shaper",
            SignalNode::DynamicsCompressor(_) => "dynamics_compressor",
            SignalNode::Convolver { .. } => "convolver",
            SignalNode::PlaybackRateModulator { .. } => "playback_rate_modulator",
        }
    }

    /// Generators produce signal from nothing and reject audio inputs.
    pub fn accepts_audio_input(&self) -> bool {
        !matches!(
            self,
            SignalNode::Oscillator { .. } | SignalNode::PlaybackRateModulator { .. }
        )
    }

    pub fn accepts_control(&self, param: ControlParam) -> bool {
        matches!(
            (self, param),
            (SignalNode::Gain { .. }, ControlParam::Gain)
                | (
                    SignalNode::PlaybackRateModulator { .. },
                    ControlParam::PlaybackRate
                )
        )
    }

    pub fn is_source(&self) -> bool {
        matches!(self, SignalNode::PlaybackRateModulator { .. })
    }
}

/// Parameter a control edge drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlParam {
    Gain,
    PlaybackRate,
}

impl Display for ControlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlParam::Gain => f.write_str("gain"),
            ControlParam::PlaybackRate => f.write_str("playback_rate"),
        }
    }
}

/// Edge kind between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    /// Sender output is summed into the receiver's audio input.
    Audio,
    /// Sender output is added to the receiver's parameter each frame.
    Control(ControlParam),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_reject_audio_input() {
        let osc = SignalNode::Oscillator {
            frequency: 30.0,
            waveform: Waveform::Sine,
        };
        let source = SignalNode::PlaybackRateModulator {
            base_rate: 1.0,
            lfo_frequency: 0.0,
            lfo_depth: 0.0,
        };
        assert!(!osc.accepts_audio_input());
        assert!(!source.accepts_audio_input());
        assert!(source.is_source());
        assert!(SignalNode::Gain { value: 1.0 }.accepts_audio_input());
    }

    #[test]
    fn control_targets_are_parameter_specific() {
        let gain = SignalNode::Gain { value: 0.5 };
        assert!(gain.accepts_control(ControlParam::Gain));
        assert!(!gain.accepts_control(ControlParam::PlaybackRate));

        let filter = SignalNode::BiquadFilter {
            kind: FilterKind::HighPass,
            cutoff: 200.0,
            q: 1.0,
        };
        assert!(!filter.accepts_control(ControlParam::Gain));
    }
}
