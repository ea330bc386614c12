//! # screen-record-core
//!
//! Platform-agnostic screen recording core library.
//!
//! Captures a mirrored display through a GPU texture relay and an audio
//! input, encodes both on dedicated task threads, and interleaves the
//! encoded samples into a single container with a shared time origin.
//! Platform backends implement the device, encoder, display and audio
//! input traits and plug into the generic [`RecordingController`].
//!
//! ## Architecture
//!
//! ```text
//! screen-record-core (this crate)
//! ├── traits/       ← GraphicsDevice, VideoEncoder, AudioEncoder, VirtualDisplay,
//! │                   AudioInput, ContainerWriter, MediaBackend, RecorderDelegate
//! ├── models/       ← CaptureError, SessionState, RecordingConfig, media types
//! ├── gpu/          ← GpuContext, RenderSurface, FrameRelay, SourceTexture
//! ├── processing/   ← CaptureSignal, SessionClock, RingBuffer, PCM conversion
//! ├── session/      ← VideoTask, AudioTask, Multiplexer, RecordingSession,
//! │                   RecordingController
//! └── storage/      ← InterleavedFileWriter, metadata sidecar
//! ```

pub mod gpu;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use gpu::matrix::TransformMatrix;
pub use gpu::source::SourceSurface;
pub use models::config::{PausePolicy, RecordingConfig};
pub use models::error::CaptureError;
pub use models::media::{Codec, EncodedSample, MediaFormat, TrackType, VideoFrame};
pub use models::recording_result::{AudioCounters, RecordingMetadata, RecordingResult, TrackSummary, VideoCounters};
pub use models::state::{SessionState, TaskState};
pub use processing::pcm::PcmConverter;
pub use processing::ring_buffer::RingBuffer;
pub use session::controller::{RecordingController, RecordingStatus, SessionHandle};
pub use session::muxer::Multiplexer;
pub use session::recording::RecordingSession;
pub use storage::container_writer::{read_container, ContainerContents, InterleavedFileWriter};
pub use traits::audio_input::{AudioBufferCallback, AudioDeviceInfo, AudioInput};
pub use traits::backend::MediaBackend;
pub use traits::container::{ContainerWriter, MuxSummary};
pub use traits::display::{DisplayParams, VirtualDisplay};
pub use traits::encoder::{AudioEncoder, Encoder, EncoderInput, EncoderOutput, InputSurfaceSink, VideoEncoder};
pub use traits::graphics::{ContextId, GraphicsDevice, ProgramId, ProgramKind, SurfaceId, TextureId, TextureTarget};
pub use traits::recorder_delegate::RecorderDelegate;
