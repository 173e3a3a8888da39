//! Offline rendering.
//!
//! The render window is the input's duration: a faster source leaves a silent
//! tail, a slower one is cut off where the input would have ended.

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::audio::SampleBuffer;
use crate::graph::SignalGraph;

use super::{GraphProcessor, RenderError, RenderOptions};

/// Render `graph` over `input` into a buffer with the input's layout, rate and
/// frame count.
///
/// Cancellation and the timeout are checked before every block.
pub fn render_offline(
    graph: &SignalGraph,
    input: Arc<SampleBuffer>,
    options: &RenderOptions,
) -> Result<SampleBuffer, RenderError> {
    let started = Instant::now();
    let frames = input.frame_count();
    let channels = input.channel_count();
    let sample_rate = input.sample_rate();
    let mut processor = GraphProcessor::new(graph, input)?;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    while output[0].len() < frames {
        if options.cancellation.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if started.elapsed() >= options.timeout {
            return Err(RenderError::Timeout {
                limit: options.timeout,
            });
        }

        let block = processor.process_block();
        let remaining = frames - output[0].len();
        for (out, channel) in output.iter_mut().zip(block) {
            let take = remaining.min(channel.len());
            out.extend_from_slice(&channel[..take]);
        }
    }

    debug!(
        "offline render: {} frames x {} channels in {} blocks ({:?})",
        frames,
        channels,
        processor.blocks_rendered(),
        started.elapsed()
    );
    Ok(SampleBuffer::new(sample_rate, output)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::graph::{build_graph, EffectSpec, GraphOptions};
    use crate::render::CancellationToken;

    fn options(seed: Option<u64>) -> GraphOptions {
        GraphOptions {
            master_volume: 0.7,
            reverb_seed: seed,
        }
    }

    fn voice(channels: usize, sample_rate: u32, frames: usize) -> Arc<SampleBuffer> {
        let data = (0..channels)
            .map(|ch| {
                (0..frames)
                    .map(|i| {
                        let t = i as f32 / sample_rate as f32;
                        0.4 * (2.0 * std::f32::consts::PI * (180.0 + 40.0 * ch as f32) * t).sin()
                    })
                    .collect()
            })
            .collect();
        Arc::new(SampleBuffer::new(sample_rate, data).unwrap())
    }

    fn render(effect: EffectSpec, input: &Arc<SampleBuffer>, seed: Option<u64>) -> SampleBuffer {
        let graph = build_graph(effect, input.sample_rate(), &options(seed)).unwrap();
        render_offline(&graph, input.clone(), &RenderOptions::default()).unwrap()
    }

    #[test]
    fn output_matches_input_shape_for_every_effect() {
        for (channels, rate, frames) in [(1, 16_000, 5_000), (2, 22_050, 3_333), (1, 8_000, 1)] {
            let input = voice(channels, rate, frames);
            for effect in EffectSpec::ALL {
                let out = render(effect, &input, None);
                assert_eq!(out.frame_count(), frames, "{} frames", effect);
                assert_eq!(out.channel_count(), channels, "{} channels", effect);
                assert_eq!(out.sample_rate(), rate, "{} rate", effect);
            }
        }
    }

    #[test]
    fn alien_and_cartoon_are_deterministic() {
        let input = voice(1, 16_000, 6_000);
        for effect in [EffectSpec::Alien, EffectSpec::Cartoon] {
            assert_eq!(render(effect, &input, None), render(effect, &input, None));
        }
    }

    #[test]
    fn ghost_is_deterministic_only_with_a_seed() {
        let input = voice(1, 16_000, 6_000);
        assert_eq!(
            render(EffectSpec::Ghost, &input, Some(9)),
            render(EffectSpec::Ghost, &input, Some(9))
        );
        let a = render(EffectSpec::Ghost, &input, None);
        let b = render(EffectSpec::Ghost, &input, None);
        assert_eq!(a.frame_count(), b.frame_count());
        assert_ne!(a, b);
    }

    #[test]
    fn cartoon_over_silence_is_near_silent() {
        let input = Arc::new(SampleBuffer::silent(1, 44_100, 88_200).unwrap());
        let out = render(EffectSpec::Cartoon, &input, None);
        assert_eq!(out.frame_count(), 88_200);
        assert!(out.peak() < 1e-6);
    }

    #[test]
    fn empty_input_renders_empty_output() {
        let input = Arc::new(SampleBuffer::silent(1, 44_100, 0).unwrap());
        for effect in EffectSpec::ALL {
            let out = render(effect, &input, None);
            assert!(out.is_empty());
            assert_eq!(out.channel_count(), 1);
        }
    }

    #[test]
    fn cartoon_leaves_a_silent_tail() {
        // 1.5x playback consumes the input after two thirds of the window.
        let tone = (0..8_000)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / 8_000.0).sin())
            .collect();
        let input = Arc::new(SampleBuffer::new(8_000, vec![tone]).unwrap());
        let out = render(EffectSpec::Cartoon, &input, None);
        let tail = &out.channel(0)[7_000..];
        let head = &out.channel(0)[1_000..4_000];
        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32;
        assert!(energy(tail) < energy(head) * 0.01);
    }

    #[test]
    fn output_is_not_clamped_before_encoding() {
        let mut graph = crate::graph::SignalGraph::new(8_000);
        let source = graph.add_node(crate::graph::SignalNode::PlaybackRateModulator {
            base_rate: 1.0,
            lfo_frequency: 0.0,
            lfo_depth: 0.0,
        });
        let boost = graph.add_node(crate::graph::SignalNode::Gain { value: 4.0 });
        graph
            .connect(source, boost, crate::graph::Connection::Audio)
            .unwrap();
        graph.set_source(source).unwrap();
        graph.set_sink(boost).unwrap();

        let input = Arc::new(SampleBuffer::new(8_000, vec![vec![0.5; 100]]).unwrap());
        let out = render_offline(&graph, input, &RenderOptions::default()).unwrap();
        assert_eq!(out.peak(), 2.0);
    }

    #[test]
    fn cancelled_token_stops_render() {
        let input = voice(1, 16_000, 16_000);
        let graph = build_graph(EffectSpec::Alien, 16_000, &options(None)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let render_options = RenderOptions {
            timeout: Duration::from_secs(30),
            cancellation: token,
        };
        assert!(matches!(
            render_offline(&graph, input, &render_options),
            Err(RenderError::Cancelled)
        ));
    }

    #[test]
    fn zero_timeout_times_out() {
        let input = voice(1, 16_000, 16_000);
        let graph = build_graph(EffectSpec::Cartoon, 16_000, &options(None)).unwrap();
        let render_options = RenderOptions {
            timeout: Duration::ZERO,
            cancellation: CancellationToken::new(),
        };
        assert!(matches!(
            render_offline(&graph, input, &render_options),
            Err(RenderError::Timeout { .. })
        ));
    }
}
