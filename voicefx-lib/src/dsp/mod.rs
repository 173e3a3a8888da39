//! DSP kernels used by graph nodes: filters, dynamics, shaping, oscillators,
//! convolution, and variable-rate playback.

pub mod biquad;
pub mod compressor;
pub mod convolution;
pub mod impulse_response;
pub mod level;
pub mod oscillator;
pub mod playback_rate;
pub mod waveshaper;
