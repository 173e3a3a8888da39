//! Capture collaborators: where recordings come from.
//!
//! There is no device-level capture here; [`FileCapture`] stands in for a
//! microphone by decoding any format symphonia understands.

use std::fmt::{self, Display};
use std::fs::File;
use std::io::{self, Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::SampleBuffer;

#[derive(Debug)]
pub enum CaptureError {
    /// The source could not be opened (missing, or access refused).
    Denied(String),
    /// The source opened but did not contain decodable audio.
    Decode(String),
    Io(io::Error),
}

impl Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied(reason) => write!(f, "capture source access denied: {}", reason),
            Self::Decode(reason) => write!(f, "failed to decode captured audio: {}", reason),
            Self::Io(err) => write!(f, "failed to read captured audio: {}", err),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<io::Error> for CaptureError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Something that can produce one recording.
pub trait CaptureSource {
    /// Capture at most `max_duration` of audio.
    fn capture(&mut self, max_duration: Duration) -> Result<SampleBuffer, CaptureError>;
}

/// Reads a recording from an audio file.
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for FileCapture {
    fn capture(&mut self, max_duration: Duration) -> Result<SampleBuffer, CaptureError> {
        let file = File::open(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                CaptureError::Denied(format!("{}: {}", self.path.display(), err))
            }
            _ => CaptureError::Io(err),
        })?;

        let mut hint = Hint::new();
        if let Some(extension) = self.path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let buffer = decode_media(Box::new(file), &hint)?;
        debug!(
            "captured {} frames x {} channels from {}",
            buffer.frame_count(),
            buffer.channel_count(),
            self.path.display()
        );
        Ok(limit_duration(buffer, max_duration))
    }
}

/// Hands out an already-recorded buffer.
#[derive(Debug, Clone)]
pub struct MemoryCapture {
    buffer: SampleBuffer,
}

impl MemoryCapture {
    pub fn new(buffer: SampleBuffer) -> Self {
        Self { buffer }
    }
}

impl CaptureSource for MemoryCapture {
    fn capture(&mut self, max_duration: Duration) -> Result<SampleBuffer, CaptureError> {
        Ok(limit_duration(self.buffer.clone(), max_duration))
    }
}

/// Decode an in-memory audio file. `extension` helps the format probe.
pub fn decode_audio_bytes(bytes: &[u8], extension: Option<&str>) -> Result<SampleBuffer, CaptureError> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }
    decode_media(Box::new(Cursor::new(bytes.to_vec())), &hint)
}

/// Keep at most `max_duration` of `buffer`.
pub fn limit_duration(buffer: SampleBuffer, max_duration: Duration) -> SampleBuffer {
    let max_frames = (max_duration.as_secs_f64() * buffer.sample_rate() as f64).round() as usize;
    if buffer.frame_count() > max_frames {
        debug!(
            "truncating capture from {} to {} frames",
            buffer.frame_count(),
            max_frames
        );
        buffer.truncated(max_frames)
    } else {
        buffer
    }
}

fn decode_media(source: Box<dyn MediaSource>, hint: &Hint) -> Result<SampleBuffer, CaptureError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|err| CaptureError::Decode(err.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CaptureError::Decode("no supported audio tracks".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let declared_channels = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| CaptureError::Decode(err.to_string()))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(CaptureError::Decode(err.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);

                let mut converted = AudioBuffer::<f32>::new(decoded.capacity() as u64, spec);
                decoded.convert(&mut converted);

                let count = spec.channels.count();
                if channels.is_empty() {
                    channels = vec![Vec::new(); count];
                }
                for (ch, out) in channels.iter_mut().enumerate().take(count) {
                    out.extend_from_slice(converted.chan(ch));
                }
            }
            Err(Error::DecodeError(err)) => warn!("skipping undecodable packet: {}", err),
            Err(err) => return Err(CaptureError::Decode(err.to_string())),
        }
    }

    if channels.is_empty() {
        channels = vec![Vec::new(); declared_channels];
    }
    let sample_rate =
        sample_rate.ok_or_else(|| CaptureError::Decode("missing sample rate".to_string()))?;
    SampleBuffer::new(sample_rate, channels).map_err(|err| CaptureError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{encode_wav, write_wav_file};

    fn tone(channels: usize, sample_rate: u32, frames: usize) -> SampleBuffer {
        let data = (0..channels)
            .map(|ch| {
                (0..frames)
                    .map(|i| ((i + ch * 17) % 100) as f32 / 100.0 - 0.5)
                    .collect()
            })
            .collect();
        SampleBuffer::new(sample_rate, data).unwrap()
    }

    #[test]
    fn file_capture_decodes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let original = tone(2, 22_050, 4_410);
        write_wav_file(&path, &original).unwrap();

        let captured = FileCapture::new(&path)
            .capture(Duration::from_secs(30))
            .unwrap();
        assert_eq!(captured.channel_count(), 2);
        assert_eq!(captured.sample_rate(), 22_050);
        assert_eq!(captured.frame_count(), 4_410);
        for (a, b) in original.channel(1).iter().zip(captured.channel(1)) {
            assert!((a - b).abs() <= 1.0 / 32_768.0 + 1e-6);
        }
    }

    #[test]
    fn capture_is_truncated_to_max_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav_file(&path, &tone(1, 8_000, 24_000)).unwrap();

        let captured = FileCapture::new(&path)
            .capture(Duration::from_secs(2))
            .unwrap();
        assert_eq!(captured.frame_count(), 16_000);
    }

    #[test]
    fn missing_file_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileCapture::new(dir.path().join("nope.wav"))
            .capture(Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Denied(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode_audio_bytes(b"definitely not audio at all", Some("wav")).unwrap_err();
        assert!(matches!(err, CaptureError::Decode(_)));
    }

    #[test]
    fn in_memory_wav_round_trips() {
        let original = tone(1, 16_000, 1_000);
        let bytes = encode_wav(&original).unwrap();
        let decoded = decode_audio_bytes(&bytes, Some("wav")).unwrap();
        assert_eq!(decoded.frame_count(), 1_000);
        assert_eq!(decoded.sample_rate(), 16_000);
    }

    #[test]
    fn memory_capture_respects_limit() {
        let mut capture = MemoryCapture::new(tone(1, 1_000, 5_000));
        assert_eq!(capture.capture(Duration::from_secs(3)).unwrap().frame_count(), 3_000);
        assert_eq!(capture.capture(Duration::from_secs(30)).unwrap().frame_count(), 5_000);
    }
}
