//! # VoiceFX Library
//!
//! Applies canned character effects (alien, cartoon, ghost) to a recorded
//! voice clip. Each effect is a small signal graph that can be previewed live
//! through the default output device or rendered offline into a 16-bit PCM
//! WAV file.

pub mod audio;
pub mod capture;
pub mod dsp;
pub mod graph;
pub mod render;
pub mod session;
pub mod settings;

pub use audio::SampleBuffer;
pub use graph::EffectSpec;
pub use session::{EffectSession, RenderedFile, SessionError};
pub use settings::SessionSettings;
