//! PCM buffers and WAV serialization.

pub mod buffer;
pub mod wav;

pub use buffer::{BufferError, SampleBuffer};
pub use wav::{decode_wav, encode_wav, write_wav_file, WavError};
