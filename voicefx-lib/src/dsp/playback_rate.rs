//! Variable-rate buffer playback.
//!
//! The read head advances by the instantaneous rate every output frame and
//! reads the buffer with linear interpolation. Past the end it yields silence.

use crate::audio::SampleBuffer;

use super::oscillator::{OscillatorState, Waveform};

#[derive(Clone, Debug)]
pub struct PlaybackRateState {
    base_rate: f32,
    lfo: Option<(OscillatorState, f32)>,
    position: f64,
}

impl PlaybackRateState {
    /// `lfo_depth == 0` or `lfo_frequency == 0` disables the built-in LFO.
    pub fn new(base_rate: f32, lfo_frequency: f32, lfo_depth: f32, sample_rate: u32) -> Self {
        let lfo = if lfo_depth != 0.0 && lfo_frequency != 0.0 {
            Some((
                OscillatorState::new(lfo_frequency, Waveform::Sine, sample_rate),
                lfo_depth,
            ))
        } else {
            None
        };
        Self {
            base_rate: sanitize_rate(base_rate),
            lfo,
            position: 0.0,
        }
    }

    /// Read position in input frames.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Whether every input frame has been played.
    pub fn is_finished(&self, input: &SampleBuffer) -> bool {
        self.position >= input.frame_count() as f64
    }

    /// Produce `frames` output frames with `input`'s channel layout.
    ///
    /// `control`, when present, is added to the rate frame by frame.
    pub fn process(
        &mut self,
        input: &SampleBuffer,
        control: Option<&[f32]>,
        frames: usize,
    ) -> Vec<Vec<f32>> {
        let lfo = self
            .lfo
            .as_mut()
            .map(|(osc, depth)| (osc.process(frames), *depth));

        let mut output = vec![Vec::with_capacity(frames); input.channel_count()];
        for frame in 0..frames {
            for (out, channel) in output.iter_mut().zip(input.channels()) {
                out.push(read_interpolated(channel, self.position));
            }

            let mut rate = self.base_rate;
            if let Some((values, depth)) = &lfo {
                rate += depth * values[frame];
            }
            if let Some(control) = control {
                rate += control.get(frame).copied().unwrap_or(0.0);
            }
            self.position += sanitize_rate(rate) as f64;
        }
        output
    }
}

fn read_interpolated(channel: &[f32], position: f64) -> f32 {
    let index = position.floor() as usize;
    let Some(&current) = channel.get(index) else {
        return 0.0;
    };
    let frac = (position - index as f64) as f32;
    if frac == 0.0 {
        return current;
    }
    let next = channel.get(index + 1).copied().unwrap_or(0.0);
    current + (next - current) * frac
}

fn sanitize_rate(rate: f32) -> f32 {
    if !rate.is_finite() {
        return 0.0;
    }
    rate.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> SampleBuffer {
        SampleBuffer::new(100, vec![(0..frames).map(|i| i as f32).collect()]).unwrap()
    }

    #[test]
    fn unit_rate_copies_input_then_silence() {
        let input = ramp(4);
        let mut state = PlaybackRateState::new(1.0, 0.0, 0.0, 100);
        let out = state.process(&input, None, 6);
        assert_eq!(out, vec![vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0]]);
        assert!(state.is_finished(&input));
    }

    #[test]
    fn faster_rate_skips_and_interpolates() {
        let input = ramp(10);
        let mut state = PlaybackRateState::new(1.5, 0.0, 0.0, 100);
        let out = state.process(&input, None, 4);
        assert_eq!(out[0], vec![0.0, 1.5, 3.0, 4.5]);
    }

    #[test]
    fn control_signal_adds_to_rate() {
        let input = ramp(10);
        let mut state = PlaybackRateState::new(1.0, 0.0, 0.0, 100);
        let control = [1.0, 1.0, -0.5];
        let out = state.process(&input, Some(&control), 4);
        assert_eq!(out[0], vec![0.0, 2.0, 4.0, 4.5]);
    }

    #[test]
    fn negative_rate_holds_position() {
        let input = ramp(10);
        let mut state = PlaybackRateState::new(0.5, 0.0, 0.0, 100);
        let control = [-2.0, -2.0];
        let out = state.process(&input, Some(&control), 3);
        assert_eq!(out[0], vec![0.0, 0.0, 0.0]);
        assert_eq!(state.position(), 0.5);
    }

    #[test]
    fn lfo_modulates_rate_around_base() {
        let input = ramp(1_000);
        let mut state = PlaybackRateState::new(1.0, 25.0, 0.5, 100);
        state.process(&input, None, 4);
        // sin at 0, 1/4, 1/2, 3/4 cycles: 0, 1, 0, -1
        assert!((state.position() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn stereo_layout_is_preserved() {
        let input = SampleBuffer::new(100, vec![vec![1.0; 3], vec![-1.0; 3]]).unwrap();
        let mut state = PlaybackRateState::new(1.0, 0.0, 0.0, 100);
        let out = state.process(&input, None, 3);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], vec![-1.0; 3]);
    }
}
