//! Graph rendering: block processor, offline render, and live playback.

pub mod live;
pub mod offline;
pub mod processor;

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{BufferError, SampleBuffer};
use crate::graph::{build_graph, EffectSpec, GraphConstructionError, GraphOptions, SignalGraph};

pub use live::{start_live, LiveEvent, LiveRender, PlaybackDevice, RenderStream, RodioPlayback};
pub use offline::render_offline;
pub use processor::GraphProcessor;

/// Frames processed per block.
pub const RENDER_QUANTUM: usize = 1024;

pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Stream to a playback device as blocks are produced.
    Live,
    /// Render the whole clip into a buffer as fast as possible.
    Offline,
}

#[derive(Debug)]
pub enum RenderError {
    Graph(GraphConstructionError),
    Timeout { limit: Duration },
    Cancelled,
    Buffer(BufferError),
    SampleRateMismatch { graph: u32, input: u32 },
    Playback(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(err) => write!(f, "invalid graph: {}", err),
            Self::Timeout { limit } => {
                write!(f, "render did not finish within {} ms", limit.as_millis())
            }
            Self::Cancelled => write!(f, "render cancelled"),
            Self::Buffer(err) => write!(f, "failed to assemble rendered audio: {}", err),
            Self::SampleRateMismatch { graph, input } => write!(
                f,
                "graph runs at {} Hz but input is {} Hz",
                graph, input
            ),
            Self::Playback(message) => write!(f, "playback failed: {}", message),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<GraphConstructionError> for RenderError {
    fn from(err: GraphConstructionError) -> Self {
        Self::Graph(err)
    }
}

impl From<BufferError> for RenderError {
    fn from(err: BufferError) -> Self {
        Self::Buffer(err)
    }
}

/// Cooperative cancellation flag shared between a caller and a render.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RENDER_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Where live renders play, and where they report how they ended.
#[derive(Clone)]
pub struct LiveOutput {
    pub device: Arc<dyn PlaybackDevice>,
    pub events: Sender<LiveEvent>,
}

/// Result of [`RenderRequest::run`], one variant per [`RenderMode`].
pub enum RenderOutcome {
    /// The finished offline buffer.
    Rendered(SampleBuffer),
    /// Handle to the playback that was started.
    Playing(LiveRender),
}

impl RenderOutcome {
    pub fn into_buffer(self) -> Option<SampleBuffer> {
        match self {
            Self::Rendered(buffer) => Some(buffer),
            Self::Playing(_) => None,
        }
    }

    pub fn into_live(self) -> Option<LiveRender> {
        match self {
            Self::Playing(live) => Some(live),
            Self::Rendered(_) => None,
        }
    }
}

/// Everything needed to render one effect over one recording.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub input: Arc<SampleBuffer>,
    pub effect: EffectSpec,
    pub mode: RenderMode,
    pub master_volume: f32,
    pub reverb_seed: Option<u64>,
}

impl RenderRequest {
    pub fn new(input: Arc<SampleBuffer>, effect: EffectSpec, mode: RenderMode) -> Self {
        let defaults = GraphOptions::default();
        Self {
            input,
            effect,
            mode,
            master_volume: defaults.master_volume,
            reverb_seed: defaults.reverb_seed,
        }
    }

    pub fn with_master_volume(mut self, master_volume: f32) -> Self {
        self.master_volume = master_volume;
        self
    }

    pub fn with_reverb_seed(mut self, seed: Option<u64>) -> Self {
        self.reverb_seed = seed;
        self
    }

    /// Build the graph and render it in this request's mode.
    ///
    /// Offline renders honour `options` and block until done. Live renders
    /// start on `output` under `id` and return at once; `options` does not
    /// apply to them.
    pub fn run(
        &self,
        id: u64,
        output: &LiveOutput,
        options: &RenderOptions,
    ) -> Result<RenderOutcome, RenderError> {
        let graph = self.build_graph()?;
        match self.mode {
            RenderMode::Offline => {
                let rendered = render_offline(&graph, self.input.clone(), options)?;
                Ok(RenderOutcome::Rendered(rendered))
            }
            RenderMode::Live => {
                let live = start_live(
                    id,
                    &graph,
                    self.input.clone(),
                    output.device.clone(),
                    output.events.clone(),
                )?;
                Ok(RenderOutcome::Playing(live))
            }
        }
    }

    /// Build this request's graph at the input's sample rate.
    pub fn build_graph(&self) -> Result<SignalGraph, GraphConstructionError> {
        build_graph(
            self.effect,
            self.input.sample_rate(),
            &GraphOptions {
                master_volume: self.master_volume,
                reverb_seed: self.reverb_seed,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::render::live::test_support::FakeDevice;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn request_builds_graph_at_input_rate() {
        let input = Arc::new(SampleBuffer::silent(1, 22_050, 10).unwrap());
        let request = RenderRequest::new(input, EffectSpec::Cartoon, RenderMode::Offline)
            .with_master_volume(0.4);
        let graph = request.build_graph().unwrap();
        assert_eq!(graph.sample_rate(), 22_050);
    }

    #[test]
    fn run_dispatches_on_mode() {
        let (events, received) = mpsc::channel();
        let output = LiveOutput {
            device: Arc::new(FakeDevice::default()),
            events,
        };
        let input = Arc::new(SampleBuffer::silent(1, 8_000, 3_000).unwrap());

        let offline = RenderRequest::new(input.clone(), EffectSpec::Alien, RenderMode::Offline)
            .run(1, &output, &RenderOptions::default())
            .unwrap();
        let rendered = offline.into_buffer().unwrap();
        assert_eq!(rendered.frame_count(), 3_000);
        assert!(received.try_recv().is_err());

        let live = RenderRequest::new(input, EffectSpec::Alien, RenderMode::Live)
            .run(2, &output, &RenderOptions::default())
            .unwrap();
        let mut live = live.into_live().unwrap();
        assert_eq!(live.id(), 2);
        live.stop();
        assert_eq!(
            received.recv_timeout(Duration::from_secs(10)).unwrap(),
            LiveEvent::Ended { id: 2 }
        );
    }

    #[test]
    fn run_offline_honours_timeout() {
        let (events, _received) = mpsc::channel();
        let output = LiveOutput {
            device: Arc::new(FakeDevice::default()),
            events,
        };
        let input = Arc::new(SampleBuffer::silent(1, 8_000, 100).unwrap());
        let request = RenderRequest::new(input, EffectSpec::Ghost, RenderMode::Offline);
        let options = RenderOptions {
            timeout: Duration::ZERO,
            cancellation: CancellationToken::new(),
        };
        assert!(matches!(
            request.run(0, &output, &options),
            Err(RenderError::Timeout { .. })
        ));
    }

    #[test]
    fn errors_describe_themselves() {
        let err = RenderError::Timeout {
            limit: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "render did not finish within 250 ms");
        let err: RenderError = GraphConstructionError::Empty.into();
        assert!(err.to_string().contains("no nodes"));
    }
}
