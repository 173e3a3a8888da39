//! Planar in-memory PCM buffers shared by every stage of the effect pipeline.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Error returned when buffer dimensions are inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferError {
    NoChannels,
    ZeroSampleRate,
    RaggedChannels { expected: usize, channel: usize, found: usize },
    PartialFrame { samples: usize, channels: usize },
}

impl Display for BufferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoChannels => write!(f, "sample buffer needs at least one channel"),
            Self::ZeroSampleRate => write!(f, "sample buffer needs a positive sample rate"),
            Self::RaggedChannels {
                expected,
                channel,
                found,
            } => write!(
                f,
                "channel {} has {} frames, expected {}",
                channel, found, expected
            ),
            Self::PartialFrame { samples, channels } => write!(
                f,
                "{} interleaved samples do not divide into {} channels",
                samples, channels
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Immutable planar PCM audio.
///
/// Every channel holds exactly [`SampleBuffer::frame_count`] samples. Values are
/// nominally in `[-1.0, 1.0]` but are not clamped here; only the WAV encoder
/// clamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    frame_count: usize,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// # Errors
    /// Fails when there are no channels, the sample rate is zero, or the
    /// channels differ in length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, BufferError> {
        if channels.is_empty() {
            return Err(BufferError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(BufferError::ZeroSampleRate);
        }

        let frame_count = channels[0].len();
        if let Some((channel, data)) = channels
            .iter()
            .enumerate()
            .find(|(_, data)| data.len() != frame_count)
        {
            return Err(BufferError::RaggedChannels {
                expected: frame_count,
                channel,
                found: data.len(),
            });
        }

        Ok(Self {
            sample_rate,
            frame_count,
            channels,
        })
    }

    /// Build a buffer of `frame_count` zeroed frames.
    pub fn silent(
        channel_count: usize,
        sample_rate: u32,
        frame_count: usize,
    ) -> Result<Self, BufferError> {
        Self::new(sample_rate, vec![vec![0.0; frame_count]; channel_count])
    }

    /// Build a buffer from interleaved samples.
    pub fn from_interleaved(
        channel_count: usize,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<Self, BufferError> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        if samples.len() % channel_count != 0 {
            return Err(BufferError::PartialFrame {
                samples: samples.len(),
                channels: channel_count,
            });
        }

        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::new(sample_rate, channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    /// Samples of one channel.
    ///
    /// # Panics
    /// Panics when `index` is not below [`SampleBuffer::channel_count`].
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Playback length at the native sample rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count as f64 / self.sample_rate as f64)
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0_f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Interleave channels frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let channel_count = self.channels.len();
        let mut out = Vec::with_capacity(self.frame_count * channel_count);
        for frame in 0..self.frame_count {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Keep at most `max_frames` leading frames.
    pub fn truncated(&self, max_frames: usize) -> Self {
        if max_frames >= self.frame_count {
            return self.clone();
        }
        Self {
            sample_rate: self.sample_rate,
            frame_count: max_frames,
            channels: self
                .channels
                .iter()
                .map(|channel| channel[..max_frames].to_vec())
                .collect(),
        }
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let err = SampleBuffer::new(44_100, vec![vec![0.0; 4], vec![0.0; 3]]).unwrap_err();
        assert_eq!(
            err,
            BufferError::RaggedChannels {
                expected: 4,
                channel: 1,
                found: 3
            }
        );
    }

    #[test]
    fn rejects_missing_channels_and_rate() {
        assert_eq!(
            SampleBuffer::new(44_100, Vec::new()).unwrap_err(),
            BufferError::NoChannels
        );
        assert_eq!(
            SampleBuffer::silent(1, 0, 10).unwrap_err(),
            BufferError::ZeroSampleRate
        );
    }

    #[test]
    fn interleaving_preserves_frame_order() {
        let samples = [0.1_f32, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = SampleBuffer::from_interleaved(2, 48_000, &samples).unwrap();
        assert_eq!(buffer.frame_count(), 3);
        assert_eq!(buffer.channel(0), &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.interleaved(), samples.to_vec());
    }

    #[test]
    fn partial_frames_are_rejected() {
        let err = SampleBuffer::from_interleaved(2, 48_000, &[0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, BufferError::PartialFrame { .. }));
    }

    #[test]
    fn duration_follows_frames_and_rate() {
        let buffer = SampleBuffer::silent(1, 44_100, 88_200).unwrap();
        assert_eq!(buffer.duration(), Duration::from_secs(2));
        assert!(!buffer.is_empty());
        assert_eq!(buffer.truncated(100).frame_count(), 100);
    }

    #[test]
    fn peak_ignores_sign() {
        let buffer = SampleBuffer::new(8_000, vec![vec![0.25, -0.75], vec![0.5, 0.0]]).unwrap();
        assert_eq!(buffer.peak(), 0.75);
    }
}
