//! Compiled, stateful form of a [`SignalGraph`].
//!
//! Nodes run in topological order once per block of [`RENDER_QUANTUM`] frames.
//! Every node's output for the current block is kept so later nodes can read
//! it through audio or control edges.

use std::sync::Arc;

use log::debug;

use crate::audio::SampleBuffer;
use crate::dsp::biquad::BiquadState;
use crate::dsp::compressor::CompressorState;
use crate::dsp::convolution::Convolver;
use crate::dsp::impulse_response::ImpulseResponse;
use crate::dsp::oscillator::OscillatorState;
use crate::dsp::playback_rate::PlaybackRateState;
use crate::dsp::waveshaper::WaveShaperState;
use crate::graph::{Connection, ControlParam, SignalGraph, SignalNode};

use super::{RenderError, RENDER_QUANTUM};

/// Planar block: one `Vec` per channel.
type Block = Vec<Vec<f32>>;

enum NodeState {
    Gain { value: f32 },
    Oscillator(OscillatorState),
    Biquad(BiquadState),
    WaveShaper(WaveShaperState),
    Compressor(CompressorState),
    Convolver(ConvolverBank),
    Source(PlaybackRateState),
}

struct CompiledNode {
    state: NodeState,
    audio_inputs: Vec<usize>,
    control_inputs: Vec<(ControlParam, usize)>,
}

/// One convolver per output channel, created as channels appear.
struct ConvolverBank {
    impulse: Arc<ImpulseResponse>,
    channels: Vec<Convolver>,
}

impl ConvolverBank {
    fn new(impulse: &ImpulseResponse, normalize: bool) -> Self {
        let impulse = if normalize {
            impulse.normalized()
        } else {
            impulse.clone()
        };
        Self {
            impulse: Arc::new(impulse),
            channels: Vec::new(),
        }
    }

    fn process(&mut self, input: &[Vec<f32>]) -> Block {
        let out_channels = input.len().max(self.impulse.channel_count()).max(1);
        while self.channels.len() < out_channels {
            let index = self.channels.len();
            self.channels.push(Convolver::new(
                self.impulse.channel_for_output(index),
                RENDER_QUANTUM * 2,
            ));
        }

        self.channels
            .iter_mut()
            .take(out_channels)
            .enumerate()
            .map(|(ch, convolver)| {
                let source = &input[if input.len() == 1 { 0 } else { ch % input.len() }];
                convolver.process(source)
            })
            .collect()
    }
}

/// Runs a validated graph block by block over one input buffer.
pub struct GraphProcessor {
    input: Arc<SampleBuffer>,
    order: Vec<usize>,
    nodes: Vec<CompiledNode>,
    outputs: Vec<Block>,
    source: usize,
    sink: usize,
    blocks_rendered: usize,
}

impl GraphProcessor {
    /// Validate `graph` and instantiate per-node state for `input`.
    pub fn new(graph: &SignalGraph, input: Arc<SampleBuffer>) -> Result<Self, RenderError> {
        let order = graph.validate()?;
        if graph.sample_rate() != input.sample_rate() {
            return Err(RenderError::SampleRateMismatch {
                graph: graph.sample_rate(),
                input: input.sample_rate(),
            });
        }

        let sample_rate = graph.sample_rate();
        let mut nodes = Vec::with_capacity(graph.node_count());
        for (id, node) in graph.nodes() {
            let mut audio_inputs = Vec::new();
            let mut control_inputs = Vec::new();
            for (from, connection) in graph.inputs(id) {
                match connection {
                    Connection::Audio => audio_inputs.push(from.index()),
                    Connection::Control(param) => control_inputs.push((param, from.index())),
                }
            }
            nodes.push(CompiledNode {
                state: instantiate(node, sample_rate),
                audio_inputs,
                control_inputs,
            });
        }

        // validate() guarantees both are set.
        let source = graph.source().map(|id| id.index()).unwrap_or(0);
        let sink = graph.sink().map(|id| id.index()).unwrap_or(0);

        debug!(
            "compiled graph of {} nodes for {} frames x {} channels",
            nodes.len(),
            input.frame_count(),
            input.channel_count()
        );

        Ok(Self {
            input,
            order: order.into_iter().map(|id| id.index()).collect(),
            outputs: vec![Vec::new(); nodes.len()],
            nodes,
            source,
            sink,
            blocks_rendered: 0,
        })
    }

    pub fn blocks_rendered(&self) -> usize {
        self.blocks_rendered
    }

    /// Whether the source has played past the end of the input.
    pub fn source_finished(&self) -> bool {
        match &self.nodes[self.source].state {
            NodeState::Source(state) => state.is_finished(&self.input),
            _ => true,
        }
    }

    /// Render the next [`RENDER_QUANTUM`] frames, mixed to the input's layout.
    pub fn process_block(&mut self) -> Block {
        let frames = RENDER_QUANTUM;
        for &index in &self.order {
            let audio = mix_inputs(&self.outputs, &self.nodes[index].audio_inputs, frames);
            let gain_control = control_sum(&self.outputs, &self.nodes[index], ControlParam::Gain, frames);
            let rate_control =
                control_sum(&self.outputs, &self.nodes[index], ControlParam::PlaybackRate, frames);

            let output = match &mut self.nodes[index].state {
                NodeState::Gain { value } => apply_gain(&audio, *value, gain_control.as_deref()),
                NodeState::Oscillator(state) => vec![state.process(frames)],
                NodeState::Biquad(state) => state.process(&audio),
                NodeState::WaveShaper(state) => state.process(&audio),
                NodeState::Compressor(state) => state.process(&audio),
                NodeState::Convolver(bank) => bank.process(&audio),
                NodeState::Source(state) => {
                    state.process(&self.input, rate_control.as_deref(), frames)
                }
            };
            self.outputs[index] = output;
        }

        self.blocks_rendered += 1;
        mix_to_channels(&self.outputs[self.sink], self.input.channel_count(), frames)
    }
}

fn instantiate(node: &SignalNode, sample_rate: u32) -> NodeState {
    match node {
        SignalNode::Gain { value } => NodeState::Gain { value: *value },
        SignalNode::Oscillator {
            frequency,
            waveform,
        } => NodeState::Oscillator(OscillatorState::new(*frequency, *waveform, sample_rate)),
        SignalNode::BiquadFilter { kind, cutoff, q } => {
            NodeState::Biquad(BiquadState::new(*kind, sample_rate, *cutoff, *q))
        }
        SignalNode::WaveShaper { curve, oversample } => {
            NodeState::WaveShaper(WaveShaperState::new(curve.clone(), *oversample))
        }
        SignalNode::DynamicsCompressor(settings) => {
            NodeState::Compressor(CompressorState::new(settings, sample_rate))
        }
        SignalNode::Convolver {
            impulse_response,
            normalize,
        } => NodeState::Convolver(ConvolverBank::new(impulse_response, *normalize)),
        SignalNode::PlaybackRateModulator {
            base_rate,
            lfo_frequency,
            lfo_depth,
        } => NodeState::Source(PlaybackRateState::new(
            *base_rate,
            *lfo_frequency,
            *lfo_depth,
            sample_rate,
        )),
    }
}

/// Sum the outputs of `inputs`, broadcasting mono to the widest layout.
/// No inputs yields one silent channel.
fn mix_inputs(outputs: &[Block], inputs: &[usize], frames: usize) -> Block {
    let channels = inputs
        .iter()
        .map(|&index| outputs[index].len())
        .max()
        .unwrap_or(1)
        .max(1);
    let mut mixed = vec![vec![0.0_f32; frames]; channels];
    for &index in inputs {
        let block = &outputs[index];
        if block.is_empty() {
            continue;
        }
        for (ch, out) in mixed.iter_mut().enumerate() {
            let source = &block[if block.len() == 1 { 0 } else { ch % block.len() }];
            for (acc, sample) in out.iter_mut().zip(source) {
                *acc += sample;
            }
        }
    }
    mixed
}

/// Sum the control senders for `param`, each down-mixed to mono.
fn control_sum(
    outputs: &[Block],
    node: &CompiledNode,
    param: ControlParam,
    frames: usize,
) -> Option<Vec<f32>> {
    let senders: Vec<usize> = node
        .control_inputs
        .iter()
        .filter(|(p, _)| *p == param)
        .map(|(_, index)| *index)
        .collect();
    if senders.is_empty() {
        return None;
    }

    let mut sum = vec![0.0_f32; frames];
    for index in senders {
        let mono = mix_to_channels(&outputs[index], 1, frames);
        for (acc, sample) in sum.iter_mut().zip(&mono[0]) {
            *acc += sample;
        }
    }
    Some(sum)
}

fn apply_gain(input: &[Vec<f32>], value: f32, control: Option<&[f32]>) -> Block {
    input
        .iter()
        .map(|channel| match control {
            Some(control) => channel
                .iter()
                .zip(control)
                .map(|(sample, offset)| sample * (value + offset))
                .collect(),
            None => channel.iter().map(|sample| sample * value).collect(),
        })
        .collect()
}

/// Up- or down-mix a block: mono is broadcast, anything to mono is averaged,
/// other layouts wrap channel indices.
pub(crate) fn mix_to_channels(block: &[Vec<f32>], target: usize, frames: usize) -> Block {
    if block.is_empty() {
        return vec![vec![0.0; frames]; target];
    }
    if block.len() == target {
        return block.to_vec();
    }
    if target == 1 {
        let scale = 1.0 / block.len() as f32;
        let mut mono = vec![0.0_f32; frames];
        for channel in block {
            for (acc, sample) in mono.iter_mut().zip(channel) {
                *acc += sample * scale;
            }
        }
        return vec![mono];
    }
    (0..target)
        .map(|ch| block[ch % block.len()].clone())
        .collect()
}
