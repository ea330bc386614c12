use std::sync::Arc;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::models::media::{EncodedSample, MediaFormat, VideoFrame};

/// Receives the frames presented on an encoder input surface.
pub trait InputSurfaceSink: Send + Sync {
    fn queue_frame(&self, frame: VideoFrame, presentation_time_ns: i64);
}

/// Handle to a video encoder's input surface.
#[derive(Clone)]
pub struct EncoderInput {
    pub width: u32,
    pub height: u32,
    pub sink: Arc<dyn InputSurfaceSink>,
}

impl std::fmt::Debug for EncoderInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderInput")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Result of polling an encoder's output queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutput {
    /// Output format is known; always reported before the first sample.
    FormatChanged(MediaFormat),
    Sample(EncodedSample),
    /// Nothing ready within the timeout.
    TryAgainLater,
    /// The encoder has emitted its last sample.
    EndOfStream,
}

/// Common lifecycle of a hardware encoder.
pub trait Encoder: Send + 'static {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Wait up to `timeout` for the next output.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput, CaptureError>;

    fn stop(&mut self);

    /// Free encoder resources. Safe to call after `stop`, or instead of it.
    fn release(&mut self);
}

/// An encoder fed through a renderable input surface.
pub trait VideoEncoder: Encoder {
    /// Must be called after `configure` and before `start`.
    fn create_input_surface(&mut self) -> Result<EncoderInput, CaptureError>;

    fn signal_end_of_input_stream(&mut self) -> Result<(), CaptureError>;
}

/// An encoder fed with PCM buffers.
pub trait AudioEncoder: Encoder {
    /// Queue little-endian PCM16. `end_of_stream` marks the final buffer.
    fn queue_input(
        &mut self,
        pcm: &[u8],
        presentation_time_us: i64,
        end_of_stream: bool,
    ) -> Result<(), CaptureError>;
}
