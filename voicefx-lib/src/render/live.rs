//! Live rendering: a streaming rodio source plus a playback thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};

use crate::audio::SampleBuffer;
use crate::graph::SignalGraph;

use super::{GraphProcessor, RenderError};

const OUTPUT_STREAM_OPEN_RETRIES: usize = 20;
const OUTPUT_STREAM_OPEN_RETRY_MS: u64 = 100;
const SINK_POLL_MS: u64 = 10;

/// Completion notice for a live render, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Ended { id: u64 },
    Failed { id: u64, message: String },
}

impl LiveEvent {
    pub fn id(&self) -> u64 {
        match self {
            LiveEvent::Ended { id } | LiveEvent::Failed { id, .. } => *id,
        }
    }
}

/// Interleaved samples of a graph render, produced block by block on demand.
///
/// Ends once the graph source has consumed the whole input, or as soon as the
/// abort flag is raised.
pub struct RenderStream {
    processor: GraphProcessor,
    block: Vec<f32>,
    position: usize,
    abort: Option<Arc<AtomicBool>>,
    channels: u16,
    sample_rate: u32,
}

impl RenderStream {
    pub fn new(graph: &SignalGraph, input: Arc<SampleBuffer>) -> Result<Self, RenderError> {
        let channels = input.channel_count().min(u16::MAX as usize) as u16;
        let sample_rate = input.sample_rate();
        Ok(Self {
            processor: GraphProcessor::new(graph, input)?,
            block: Vec::new(),
            position: 0,
            abort: None,
            channels,
            sample_rate,
        })
    }

    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = Some(abort);
        self
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .map(|abort| abort.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn refill(&mut self) -> bool {
        if self.aborted() || self.processor.source_finished() {
            return false;
        }

        let planar = self.processor.process_block();
        let frames = planar.first().map(Vec::len).unwrap_or(0);
        self.block.clear();
        for frame in 0..frames {
            for channel in &planar {
                self.block.push(channel[frame]);
            }
        }
        self.position = 0;
        !self.block.is_empty()
    }
}

impl Iterator for RenderStream {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.block.len() && !self.refill() {
            return None;
        }
        let sample = self.block[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for RenderStream {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Output collaborator for live renders.
pub trait PlaybackDevice: Send + Sync {
    /// Play `stream` until it ends or `abort` is raised. Blocks the caller.
    fn play(&self, stream: RenderStream, abort: &AtomicBool) -> Result<(), RenderError>;
}

/// Plays through the system's default output device.
#[derive(Debug, Clone)]
pub struct RodioPlayback {
    open_retries: usize,
    retry_delay: Duration,
}

impl Default for RodioPlayback {
    fn default() -> Self {
        Self {
            open_retries: OUTPUT_STREAM_OPEN_RETRIES,
            retry_delay: Duration::from_millis(OUTPUT_STREAM_OPEN_RETRY_MS),
        }
    }
}

impl RodioPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_output_stream(&self) -> Result<OutputStream, RenderError> {
        let attempts = self.open_retries.max(1);
        for attempt in 1..=attempts {
            match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    if attempt == attempts {
                        error!(
                            "failed to open default output stream after {} attempts: {}",
                            attempts, err
                        );
                        return Err(RenderError::Playback(err.to_string()));
                    }
                    warn!(
                        "open_default_stream attempt {}/{} failed: {}",
                        attempt, attempts, err
                    );
                    thread::sleep(self.retry_delay);
                }
            }
        }
        Err(RenderError::Playback("no output stream".to_string()))
    }
}

impl PlaybackDevice for RodioPlayback {
    fn play(&self, stream: RenderStream, abort: &AtomicBool) -> Result<(), RenderError> {
        let output = self.open_output_stream()?;
        let sink = Sink::connect_new(output.mixer());
        sink.append(stream);

        loop {
            if abort.load(Ordering::Relaxed) {
                sink.stop();
                break;
            }
            if sink.empty() {
                break;
            }
            thread::sleep(Duration::from_millis(SINK_POLL_MS));
        }
        Ok(())
    }
}

/// Handle to a running live render. Dropping it stops the render.
pub struct LiveRender {
    id: u64,
    abort: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LiveRender {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the render thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Raise the abort flag and wait for the render thread to release the
    /// device. Safe to call more than once.
    pub fn stop(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("live render {} thread panicked", self.id);
            }
            debug!("live render {} stopped", self.id);
        }
    }
}

impl Drop for LiveRender {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Compile `graph` over `input` and start playing it on a render thread.
///
/// Graph errors are returned before any thread starts. The outcome of the
/// playback itself is sent on `events`.
pub fn start_live(
    id: u64,
    graph: &SignalGraph,
    input: Arc<SampleBuffer>,
    device: Arc<dyn PlaybackDevice>,
    events: Sender<LiveEvent>,
) -> Result<LiveRender, RenderError> {
    let abort = Arc::new(AtomicBool::new(false));
    let stream = RenderStream::new(graph, input)?.with_abort(abort.clone());
    let thread_abort = abort.clone();

    let handle = thread::Builder::new()
        .name(format!("voicefx-live-{}", id))
        .spawn(move || {
            let event = match device.play(stream, &thread_abort) {
                Ok(()) => LiveEvent::Ended { id },
                Err(err) => {
                    warn!("live render {} failed: {}", id, err);
                    LiveEvent::Failed {
                        id,
                        message: err.to_string(),
                    }
                }
            };
            if events.send(event).is_err() {
                debug!("live render {} finished with no listener", id);
            }
        })
        .map_err(|err| RenderError::Playback(err.to_string()))?;

    debug!("live render {} started", id);
    Ok(LiveRender {
        id,
        abort,
        handle: Some(handle),
    })
}
