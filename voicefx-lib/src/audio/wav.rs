//! Canonical 16-bit PCM WAV serialization.
//!
//! Output always uses the 44-byte `RIFF`/`WAVE` header with a 16-byte `fmt `
//! chunk, followed by interleaved little-endian `i16` samples.

use std::fmt::{Display, Formatter};
use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::debug;

use super::buffer::{BufferError, SampleBuffer};

/// Size of the canonical header written before the sample data.
pub const WAV_HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: usize = 2;
const FMT_CHUNK_LEN: u32 = 16;
const WAVE_FORMAT_PCM: u16 = 1;

/// Error type for WAV encoding and decoding.
#[derive(Debug)]
pub enum WavError {
    Io(std::io::Error),
    Hound(hound::Error),
    Buffer(BufferError),
    TooManyChannels(usize),
    TooLong(usize),
    UnsupportedFormat(String),
}

impl Display for WavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Hound(err) => write!(f, "wav error: {}", err),
            Self::Buffer(err) => write!(f, "invalid wav payload: {}", err),
            Self::TooManyChannels(count) => write!(f, "cannot encode {} channels", count),
            Self::TooLong(bytes) => write!(f, "{} bytes of audio exceed the wav size limit", bytes),
            Self::UnsupportedFormat(detail) => write!(f, "unsupported wav format: {}", detail),
        }
    }
}

impl std::error::Error for WavError {}

impl From<std::io::Error> for WavError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<hound::Error> for WavError {
    fn from(value: hound::Error) -> Self {
        Self::Hound(value)
    }
}

impl From<BufferError> for WavError {
    fn from(value: BufferError) -> Self {
        Self::Buffer(value)
    }
}

/// Exact encoded length for a buffer of the given shape.
pub fn encoded_len(frame_count: usize, channel_count: usize) -> usize {
    WAV_HEADER_LEN + frame_count * channel_count * BYTES_PER_SAMPLE
}

/// Quantize one sample to signed 16-bit.
///
/// The sample is clamped to `[-1, 1]` first; negative values scale by 32768
/// and non-negative values by 32767, so both rails are reachable.
pub fn quantize_sample(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0).round() as i16
    } else {
        (s * 32_767.0).round() as i16
    }
}

/// Inverse of [`quantize_sample`].
pub fn dequantize_sample(value: i16) -> f32 {
    if value < 0 {
        value as f32 / 32_768.0
    } else {
        value as f32 / 32_767.0
    }
}

/// Encode a buffer as a complete WAV byte stream.
///
/// The header is always the 44-byte `WAVE_FORMAT_PCM` layout, whatever the
/// channel count.
///
/// # Returns
/// Exactly [`encoded_len`] bytes.
///
/// # Errors
/// Fails if the channel count or data size does not fit the header fields.
pub fn encode_wav(buffer: &SampleBuffer) -> Result<Vec<u8>, WavError> {
    let channel_count = buffer.channel_count();
    let channels =
        u16::try_from(channel_count).map_err(|_| WavError::TooManyChannels(channel_count))?;
    let block_align = channels
        .checked_mul(BYTES_PER_SAMPLE as u16)
        .ok_or(WavError::TooManyChannels(channel_count))?;
    let byte_rate = buffer
        .sample_rate()
        .checked_mul(block_align as u32)
        .ok_or(WavError::TooManyChannels(channel_count))?;

    let total_len = encoded_len(buffer.frame_count(), channel_count);
    let data_len = total_len - WAV_HEADER_LEN;
    let riff_len = u32::try_from(total_len - 8).map_err(|_| WavError::TooLong(data_len))?;

    let mut bytes = Vec::with_capacity(total_len);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&riff_len.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    bytes.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&buffer.sample_rate().to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());

    for frame in 0..buffer.frame_count() {
        for channel in buffer.channels() {
            bytes.extend_from_slice(&quantize_sample(channel[frame]).to_le_bytes());
        }
    }

    debug!(
        "encoded {} frames x {} channels into {} bytes",
        buffer.frame_count(),
        channel_count,
        bytes.len()
    );
    Ok(bytes)
}

/// Decode a 16-bit PCM WAV byte stream back into a buffer.
///
/// # Errors
/// Fails for malformed input or any format other than 16-bit integer PCM.
pub fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer, WavError> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
        return Err(WavError::UnsupportedFormat(format!(
            "{:?} at {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let mut interleaved = Vec::with_capacity(reader.len() as usize);
    for sample in reader.samples::<i16>() {
        interleaved.push(dequantize_sample(sample?));
    }

    Ok(SampleBuffer::from_interleaved(
        spec.channels as usize,
        spec.sample_rate,
        &interleaved,
    )?)
}

/// Encode a buffer and write it to `path`.
pub fn write_wav_file(path: impl AsRef<Path>, buffer: &SampleBuffer) -> Result<(), WavError> {
    let bytes = encode_wav(buffer)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn header_fields_are_canonical() {
        let buffer = SampleBuffer::silent(2, 48_000, 10).unwrap();
        let bytes = encode_wav(&buffer).unwrap();

        assert_eq!(bytes.len(), 44 + 10 * 2 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 36 + 40);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 48_000);
        assert_eq!(u32_at(&bytes, 28), 48_000 * 2 * 2);
        assert_eq!(u16_at(&bytes, 32), 4);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 40);
    }

    #[test]
    fn empty_buffer_is_header_only() {
        let buffer = SampleBuffer::silent(1, 44_100, 0).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN);
        assert_eq!(u32_at(&bytes, 4), 36);
        assert_eq!(u32_at(&bytes, 40), 0);
    }

    #[test]
    fn quantization_reaches_both_rails_and_clamps() {
        assert_eq!(quantize_sample(1.0), i16::MAX);
        assert_eq!(quantize_sample(-1.0), i16::MIN);
        assert_eq!(quantize_sample(3.5), i16::MAX);
        assert_eq!(quantize_sample(-7.0), i16::MIN);
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(0.5), 16_384);
        assert_eq!(quantize_sample(-0.5), -16_384);
    }

    #[test]
    fn out_of_range_samples_are_written_clamped() {
        let buffer = SampleBuffer::new(8_000, vec![vec![2.0, -2.0, 1.5, -1.5]]).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        let data: Vec<i16> = bytes[WAV_HEADER_LEN..]
            .chunks(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(data, vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn samples_are_interleaved_little_endian() {
        let buffer = SampleBuffer::new(8_000, vec![vec![1.0], vec![-1.0]]).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        assert_eq!(&bytes[44..48], &[0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn decoded_samples_stay_within_quantization_error() {
        for channels in 1..=2 {
            for frames in [0_usize, 1, 17, 1000] {
                let data: Vec<Vec<f32>> = (0..channels)
                    .map(|c| {
                        (0..frames)
                            .map(|i| ((i as f32 * 0.37 + c as f32).sin() * 0.99))
                            .collect()
                    })
                    .collect();
                let original = SampleBuffer::new(22_050, data).unwrap();
                let bytes = encode_wav(&original).unwrap();
                assert_eq!(bytes.len(), encoded_len(frames, channels));

                let decoded = decode_wav(&bytes).unwrap();
                assert_eq!(decoded.channel_count(), channels);
                assert_eq!(decoded.frame_count(), frames);
                assert_eq!(decoded.sample_rate(), 22_050);
                for (a, b) in original.channels().iter().zip(decoded.channels()) {
                    for (x, y) in a.iter().zip(b) {
                        assert!((x - y).abs() <= 1.0 / 32_768.0, "{} vs {}", x, y);
                    }
                }
            }
        }
    }

    #[test]
    fn multichannel_keeps_the_canonical_header() {
        let data = (0..3)
            .map(|c| (0..10).map(|i| (i as f32 - c as f32) / 20.0).collect())
            .collect();
        let buffer = SampleBuffer::new(16_000, data).unwrap();
        let bytes = encode_wav(&buffer).unwrap();

        assert_eq!(bytes.len(), 44 + 10 * 3 * 2);
        assert_eq!(bytes.len(), encoded_len(10, 3));
        assert_eq!(u32_at(&bytes, 4), 36 + 60);
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 3);
        assert_eq!(u32_at(&bytes, 28), 16_000 * 3 * 2);
        assert_eq!(u16_at(&bytes, 32), 6);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 60);

        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.channel_count(), 3);
        assert_eq!(decoded.frame_count(), 10);
        for (a, b) in buffer.channels().iter().zip(decoded.channels()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() <= 1.0 / 32_768.0);
            }
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_wav(b"not a wav file at all").is_err());
    }
}
