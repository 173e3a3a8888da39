//! Per-effect graph construction.

use std::sync::Arc;

use log::debug;

use crate::dsp::biquad::{FilterKind, DEFAULT_Q};
use crate::dsp::compressor::CompressorSettings;
use crate::dsp::impulse_response::{synthesize_reverb_impulse_seeded, ImpulseResponse};
use crate::dsp::oscillator::Waveform;
use crate::dsp::waveshaper::{distortion_curve, Oversample, CURVE_LEN};

use super::{
    Connection, ControlParam, EffectSpec, GraphConstructionError, NodeId, SignalGraph, SignalNode,
};

pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;

const ALIEN_RING_FREQUENCY: f32 = 30.0;
const ALIEN_RING_GAIN: f32 = 0.5;
const ALIEN_DISTORTION: f32 = 30.0;
const ALIEN_HIGH_PASS: f32 = 200.0;

const CARTOON_RATE: f32 = 1.5;
const CARTOON_HIGH_PASS: f32 = 300.0;

const GHOST_RATE: f32 = 0.9;
const GHOST_WOBBLE_FREQUENCY: f32 = 0.7;
const GHOST_WOBBLE_DEPTH: f32 = 0.1;

/// Caller-tunable parts of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    /// Final output gain, clamped into `[0, 1]`.
    pub master_volume: f32,
    /// Fixes the Ghost reverb noise; `None` draws fresh noise every build.
    pub reverb_seed: Option<u64>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            master_volume: DEFAULT_MASTER_VOLUME,
            reverb_seed: None,
        }
    }
}

/// Clamp a master volume into `[0, 1]`; NaN falls back to the default.
pub fn clamp_master_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return DEFAULT_MASTER_VOLUME;
    }
    volume.clamp(0.0, 1.0)
}

/// Build the processing graph for `effect`.
///
/// # Errors
/// Fails only when `sample_rate` is zero.
pub fn build_graph(
    effect: EffectSpec,
    sample_rate: u32,
    options: &GraphOptions,
) -> Result<SignalGraph, GraphConstructionError> {
    if sample_rate == 0 {
        return Err(GraphConstructionError::InvalidSampleRate(sample_rate));
    }

    let mut graph = SignalGraph::new(sample_rate);
    let tail = match effect {
        EffectSpec::Alien => build_alien(&mut graph)?,
        EffectSpec::Cartoon => build_cartoon(&mut graph)?,
        EffectSpec::Ghost => build_ghost(&mut graph, options.reverb_seed)?,
    };

    let master = graph.add_node(SignalNode::Gain {
        value: clamp_master_volume(options.master_volume),
    });
    graph.connect(tail, master, Connection::Audio)?;
    graph.set_sink(master)?;

    debug!(
        "built {} graph: {} nodes, {} edges at {} Hz",
        effect,
        graph.node_count(),
        graph.edge_count(),
        sample_rate
    );
    Ok(graph)
}

fn add_source(graph: &mut SignalGraph, base_rate: f32) -> Result<NodeId, GraphConstructionError> {
    let source = graph.add_node(SignalNode::PlaybackRateModulator {
        base_rate,
        lfo_frequency: 0.0,
        lfo_depth: 0.0,
    });
    graph.set_source(source)?;
    Ok(source)
}

/// source → ring gain (± 30 Hz sine) → distortion → high-pass.
fn build_alien(graph: &mut SignalGraph) -> Result<NodeId, GraphConstructionError> {
    let source = add_source(graph, 1.0)?;

    let ring = graph.add_node(SignalNode::Gain {
        value: ALIEN_RING_GAIN,
    });
    let carrier = graph.add_node(SignalNode::Oscillator {
        frequency: ALIEN_RING_FREQUENCY,
        waveform: Waveform::Sine,
    });
    let shaper = graph.add_node(SignalNode::WaveShaper {
        curve: Arc::from(distortion_curve(ALIEN_DISTORTION, CURVE_LEN)),
        oversample: Oversample::X4,
    });
    let filter = graph.add_node(SignalNode::BiquadFilter {
        kind: FilterKind::HighPass,
        cutoff: ALIEN_HIGH_PASS,
        q: DEFAULT_Q,
    });

    graph.connect(source, ring, Connection::Audio)?;
    graph.connect(carrier, ring, Connection::Control(ControlParam::Gain))?;
    graph.connect(ring, shaper, Connection::Audio)?;
    graph.connect(shaper, filter, Connection::Audio)?;
    Ok(filter)
}

/// 1.5× source → compressor → high-pass.
fn build_cartoon(graph: &mut SignalGraph) -> Result<NodeId, GraphConstructionError> {
    let source = add_source(graph, CARTOON_RATE)?;

    let compressor = graph.add_node(SignalNode::DynamicsCompressor(CompressorSettings::default()));
    let filter = graph.add_node(SignalNode::BiquadFilter {
        kind: FilterKind::HighPass,
        cutoff: CARTOON_HIGH_PASS,
        q: DEFAULT_Q,
    });

    graph.connect(source, compressor, Connection::Audio)?;
    graph.connect(compressor, filter, Connection::Audio)?;
    Ok(filter)
}

/// 0.9× source wobbled by a 0.7 Hz LFO → normalized synthetic reverb.
fn build_ghost(
    graph: &mut SignalGraph,
    reverb_seed: Option<u64>,
) -> Result<NodeId, GraphConstructionError> {
    let source = add_source(graph, GHOST_RATE)?;

    let wobble = graph.add_node(SignalNode::Oscillator {
        frequency: GHOST_WOBBLE_FREQUENCY,
        waveform: Waveform::Sine,
    });
    let depth = graph.add_node(SignalNode::Gain {
        value: GHOST_WOBBLE_DEPTH,
    });

    let impulse = synthesize_reverb_impulse_seeded(graph.sample_rate(), reverb_seed)?;
    let reverb = graph.add_node(SignalNode::Convolver {
        impulse_response: Arc::new(ImpulseResponse::from(impulse)),
        normalize: true,
    });

    graph.connect(wobble, depth, Connection::Audio)?;
    graph.connect(depth, source, Connection::Control(ControlParam::PlaybackRate))?;
    graph.connect(source, reverb, Connection::Audio)?;
    Ok(reverb)
}
