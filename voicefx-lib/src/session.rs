//! The effect session: one recording, at most one live preview, downloads on
//! demand.

use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::{encode_wav, SampleBuffer, WavError};
use crate::capture::{CaptureError, CaptureSource};
use crate::graph::builder::{clamp_master_volume, DEFAULT_MASTER_VOLUME};
use crate::graph::{EffectSpec, GraphConstructionError, UnknownEffectError};
use crate::render::{
    CancellationToken, LiveEvent, LiveOutput, LiveRender, PlaybackDevice, RenderError,
    RenderMode, RenderOptions, RenderRequest, RodioPlayback,
};
use crate::settings::SessionSettings;

pub const STATUS_RECORDED: &str = "Recording complete! Choose an effect to play.";
pub const STATUS_NO_RECORDING: &str = "Please record something first!";
pub const STATUS_CAPTURE_DENIED: &str = "Microphone access denied";
pub const STATUS_CAPTURE_FAILED: &str = "Error processing recording";

#[derive(Debug)]
pub enum SessionError {
    NoRecording,
    UnknownEffect(UnknownEffectError),
    Capture(CaptureError),
    Graph(GraphConstructionError),
    Render(RenderError),
    Wav(WavError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecording => write!(f, "no recording loaded"),
            Self::UnknownEffect(err) => write!(f, "{}", err),
            Self::Capture(err) => write!(f, "{}", err),
            Self::Graph(err) => write!(f, "failed to build effect graph: {}", err),
            Self::Render(err) => write!(f, "{}", err),
            Self::Wav(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<UnknownEffectError> for SessionError {
    fn from(err: UnknownEffectError) -> Self {
        Self::UnknownEffect(err)
    }
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        Self::Capture(err)
    }
}

impl From<GraphConstructionError> for SessionError {
    fn from(err: GraphConstructionError) -> Self {
        Self::Graph(err)
    }
}

impl From<RenderError> for SessionError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Graph(err) => Self::Graph(err),
            other => Self::Render(other),
        }
    }
}

impl From<WavError> for SessionError {
    fn from(err: WavError) -> Self {
        Self::Wav(err)
    }
}

/// An encoded render, named for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub effect: EffectSpec,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RenderedFile {
    /// Write into `dir` under [`RenderedFile::file_name`].
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub struct EffectSession {
    settings: SessionSettings,
    recording: Option<Arc<SampleBuffer>>,
    active: Option<LiveRender>,
    output: LiveOutput,
    events: Receiver<LiveEvent>,
    next_render_id: u64,
    status: String,
}

impl EffectSession {
    /// Session that previews through the default output device.
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_device(settings, Arc::new(RodioPlayback::new()))
    }

    pub fn with_device(settings: SessionSettings, device: Arc<dyn PlaybackDevice>) -> Self {
        let (events_tx, events) = mpsc::channel();
        let status = idle_status(&settings);
        Self {
            settings,
            recording: None,
            active: None,
            output: LiveOutput {
                device,
                events: events_tx,
            },
            events,
            next_render_id: 0,
            status,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Human-readable description of the last thing that happened.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn has_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn recording(&self) -> Option<&SampleBuffer> {
        self.recording.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .map(|live| !live.is_finished())
            .unwrap_or(false)
    }

    pub fn active_render_id(&self) -> Option<u64> {
        self.active.as_ref().map(LiveRender::id)
    }

    pub fn master_volume(&self) -> f32 {
        self.settings.master_volume
    }

    /// Takes effect on the next render.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.settings.master_volume = clamp_master_volume(volume);
    }

    pub fn set_volume_percent(&mut self, percent: u8) {
        self.set_master_volume(percent.min(100) as f32 / 100.0);
    }

    /// Replace the recording, stopping any preview of the previous one.
    pub fn load_recording(&mut self, buffer: SampleBuffer) {
        self.stop();
        info!(
            "recording loaded: {:?}, {} frames x {} channels at {} Hz",
            buffer.duration(),
            buffer.frame_count(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        self.recording = Some(Arc::new(buffer));
        self.status = STATUS_RECORDED.to_string();
    }

    /// Capture a new recording, bounded by the configured maximum duration.
    ///
    /// On failure the current recording, if any, is kept.
    pub fn record<C: CaptureSource + ?Sized>(&mut self, source: &mut C) -> Result<(), SessionError> {
        match source.capture(self.settings.max_capture_duration()) {
            Ok(buffer) => {
                self.load_recording(buffer);
                Ok(())
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Start a live preview of `effect`, replacing any running one.
    ///
    /// Returns the new render's id once playback has been handed to the
    /// render thread.
    pub fn preview(&mut self, effect: EffectSpec) -> Result<u64, SessionError> {
        let request = match self.request(effect, RenderMode::Live) {
            Ok(request) => request,
            Err(err) => return Err(self.fail(err)),
        };
        self.stop();

        let id = self.allocate_render_id();
        let started = request
            .run(id, &self.output, &RenderOptions::default())
            .and_then(|outcome| {
                outcome.into_live().ok_or_else(|| {
                    RenderError::Playback("live render produced no playback".to_string())
                })
            });
        match started {
            Ok(live) => {
                info!("previewing {} effect (render {})", effect, id);
                self.active = Some(live);
                self.status = format!("Playing {} effect", effect);
                Ok(id)
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    pub fn preview_named(&mut self, name: &str) -> Result<u64, SessionError> {
        let effect = self.parse_effect(name)?;
        self.preview(effect)
    }

    /// Render `effect` offline and encode it as WAV.
    pub fn download(&mut self, effect: EffectSpec) -> Result<RenderedFile, SessionError> {
        self.download_with_token(effect, &CancellationToken::new())
    }

    /// As [`EffectSession::download`], abandoning the render once `token` is
    /// cancelled.
    pub fn download_with_token(
        &mut self,
        effect: EffectSpec,
        token: &CancellationToken,
    ) -> Result<RenderedFile, SessionError> {
        match self.render_file(effect, token) {
            Ok(file) => {
                info!("rendered {} ({} bytes)", file.file_name, file.bytes.len());
                self.status = format!("Saved {}", file.file_name);
                Ok(file)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn download_named(&mut self, name: &str) -> Result<RenderedFile, SessionError> {
        let effect = self.parse_effect(name)?;
        self.download(effect)
    }

    /// Stop the live preview, if any, and wait for the device to be released.
    pub fn stop(&mut self) {
        if let Some(mut live) = self.active.take() {
            live.stop();
            info!("stopped preview (render {})", live.id());
        }
    }

    /// Drop the recording and stop playback.
    pub fn clear(&mut self) {
        self.stop();
        self.recording = None;
        self.status = idle_status(&self.settings);
    }

    /// [`EffectSession::clear`] plus the default volume.
    pub fn reset(&mut self) {
        self.clear();
        self.settings.master_volume = DEFAULT_MASTER_VOLUME;
    }

    /// Drain live render notifications, releasing the active slot when its
    /// render has ended.
    pub fn poll_events(&mut self) -> Vec<LiveEvent> {
        let events: Vec<LiveEvent> = self.events.try_iter().collect();
        for event in &events {
            if self.active_render_id() != Some(event.id()) {
                debug!("ignoring event for inactive render {}", event.id());
                continue;
            }
            self.stop();
            self.status = match event {
                LiveEvent::Ended { .. } => "Playback finished".to_string(),
                LiveEvent::Failed { message, .. } => {
                    warn!("preview failed: {}", message);
                    format!("Playback failed: {}", message)
                }
            };
        }
        events
    }

    fn request(&self, effect: EffectSpec, mode: RenderMode) -> Result<RenderRequest, SessionError> {
        let input = self.recording.clone().ok_or(SessionError::NoRecording)?;
        Ok(RenderRequest::new(input, effect, mode)
            .with_master_volume(self.settings.master_volume)
            .with_reverb_seed(self.settings.reverb_seed))
    }

    fn allocate_render_id(&mut self) -> u64 {
        let id = self.next_render_id;
        self.next_render_id += 1;
        id
    }

    fn render_file(
        &mut self,
        effect: EffectSpec,
        token: &CancellationToken,
    ) -> Result<RenderedFile, SessionError> {
        let request = self.request(effect, RenderMode::Offline)?;
        let options = RenderOptions {
            timeout: self.settings.render_timeout(),
            cancellation: token.clone(),
        };
        let id = self.allocate_render_id();
        let rendered = request
            .run(id, &self.output, &options)?
            .into_buffer()
            .ok_or_else(|| {
                RenderError::Playback("offline render produced no buffer".to_string())
            })?;
        Ok(RenderedFile {
            effect,
            file_name: effect.file_name(),
            bytes: encode_wav(&rendered)?,
        })
    }

    fn parse_effect(&mut self, name: &str) -> Result<EffectSpec, SessionError> {
        name.parse::<EffectSpec>()
            .map_err(|err| self.fail(err.into()))
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!("{}", err);
        self.status = match &err {
            SessionError::NoRecording => STATUS_NO_RECORDING.to_string(),
            SessionError::Capture(CaptureError::Denied(_)) => STATUS_CAPTURE_DENIED.to_string(),
            SessionError::Capture(_) => STATUS_CAPTURE_FAILED.to_string(),
            other => other.to_string(),
        };
        err
    }
}

impl Drop for EffectSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn idle_status(settings: &SessionSettings) -> String {
    format!(
        "Click to start recording (max {} seconds)",
        settings.max_capture_seconds
    )
}
