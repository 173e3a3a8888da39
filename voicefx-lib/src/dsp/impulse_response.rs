//! Synthetic reverb impulse responses and convolver normalization.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::{BufferError, SampleBuffer};

/// Length of the synthesized reverb tail.
pub const REVERB_SECONDS: f64 = 1.5;
/// Peak amplitude of the noise before decay.
pub const REVERB_AMPLITUDE: f32 = 0.2;
/// Channels in a synthesized reverb.
pub const REVERB_CHANNELS: usize = 2;

const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44_100.0;
const MIN_POWER: f32 = 0.000125;

#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl ImpulseResponse {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// IR channel used for output channel `index`; mono IRs feed every output.
    pub fn channel_for_output(&self, index: usize) -> &[f32] {
        if self.channels.is_empty() {
            return &[];
        }

        if self.channels.len() == 1 {
            return &self.channels[0];
        }

        let channel_index = index % self.channels.len();
        &self.channels[channel_index]
    }

    /// Scale that brings the IR to a calibrated loudness.
    ///
    /// Uses the RMS over all channels, floored so near-silent responses do not
    /// explode, and compensates for sample rates other than 44.1 kHz.
    pub fn normalization_scale(&self) -> f32 {
        let total_len: usize = self.channels.iter().map(Vec::len).sum();
        if total_len == 0 || self.sample_rate == 0 {
            return 1.0;
        }

        let power: f32 = self
            .channels
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|sample| sample * sample)
            .sum();
        let mut rms = (power / total_len as f32).sqrt();
        if !rms.is_finite() || rms < MIN_POWER {
            rms = MIN_POWER;
        }

        (1.0 / rms) * GAIN_CALIBRATION * GAIN_CALIBRATION_SAMPLE_RATE / self.sample_rate as f32
    }

    /// Copy of the IR with `normalization_scale` applied.
    pub fn normalized(&self) -> ImpulseResponse {
        let scale = self.normalization_scale();
        ImpulseResponse {
            sample_rate: self.sample_rate,
            channels: self
                .channels
                .iter()
                .map(|channel| channel.iter().map(|s| s * scale).collect())
                .collect(),
        }
    }
}

impl From<SampleBuffer> for ImpulseResponse {
    fn from(buffer: SampleBuffer) -> Self {
        Self {
            sample_rate: buffer.sample_rate(),
            channels: buffer.into_channels(),
        }
    }
}

/// Frames in a reverb tail at `sample_rate`.
pub fn reverb_length(sample_rate: u32) -> usize {
    (sample_rate as f64 * REVERB_SECONDS).round() as usize
}

/// Decaying stereo noise: `U(-1, 1) · (1 - i/L)² · 0.2` per channel and frame.
///
/// # Errors
/// Fails only for a zero sample rate.
pub fn synthesize_reverb_impulse<R: Rng + ?Sized>(
    sample_rate: u32,
    rng: &mut R,
) -> Result<SampleBuffer, BufferError> {
    let length = reverb_length(sample_rate);
    let channels: Vec<Vec<f32>> = (0..REVERB_CHANNELS)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let decay = 1.0 - i as f32 / length as f32;
                    (rng.gen::<f32>() * 2.0 - 1.0) * decay * decay * REVERB_AMPLITUDE
                })
                .collect()
        })
        .collect();

    SampleBuffer::new(sample_rate, channels)
}

/// Synthesize from a fixed seed, or from the thread RNG when `seed` is `None`.
pub fn synthesize_reverb_impulse_seeded(
    sample_rate: u32,
    seed: Option<u64>,
) -> Result<SampleBuffer, BufferError> {
    match seed {
        Some(seed) => {
            debug!("synthesizing reverb impulse with seed {}", seed);
            let mut rng = StdRng::seed_from_u64(seed);
            synthesize_reverb_impulse(sample_rate, &mut rng)
        }
        None => synthesize_reverb_impulse(sample_rate, &mut rand::thread_rng()),
    }
}
