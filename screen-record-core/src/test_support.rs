//! Fakes shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::gpu::matrix::TransformMatrix;
use crate::gpu::source::SourceSurface;
use crate::models::error::CaptureError;
use crate::models::media::{EncodedSample, MediaFormat, TrackType, VideoFrame};
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;
use crate::traits::audio_input::{AudioBufferCallback, AudioDeviceInfo, AudioInput};
use crate::traits::backend::MediaBackend;
use crate::traits::container::{ContainerWriter, MuxSummary};
use crate::traits::display::{DisplayParams, VirtualDisplay};
use crate::traits::encoder::{
    AudioEncoder, Encoder, EncoderInput, EncoderOutput, InputSurfaceSink, VideoEncoder,
};
use crate::traits::graphics::{
    ContextId, GraphicsDevice, ProgramId, ProgramKind, SurfaceId, TextureId, TextureTarget, NO_ERROR,
};
use crate::traits::recorder_delegate::RecorderDelegate;

// --- Graphics -------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeGpuState {
    pub live_contexts: usize,
    pub live_surfaces: usize,
    pub live_textures: usize,
    pub live_programs: usize,
    pub draws: u64,
    pub swaps: u64,
    pub pending_error: u32,
    pub fail_context: bool,
    /// Error raised by every draw while set.
    pub fail_draw: Option<u32>,
    next_id: u32,
    textures: HashMap<TextureId, (TextureTarget, Option<VideoFrame>)>,
    windows: HashMap<SurfaceId, (EncoderInput, i64)>,
    content: HashMap<SurfaceId, VideoFrame>,
    current: Option<SurfaceId>,
}

impl FakeGpuState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Graphics device that tracks live objects and forwards presented window
/// surfaces to their encoder sink.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<FakeGpuState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<Mutex<FakeGpuState>> {
        Arc::clone(&self.state)
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().live_textures
    }

    pub fn texture_target(&self, texture: TextureId) -> Option<TextureTarget> {
        self.state.lock().textures.get(&texture).map(|(target, _)| *target)
    }

    /// First pixel of the image latched into `texture`.
    pub fn latched_pixel(&self, texture: TextureId) -> Option<u32> {
        let state = self.state.lock();
        state
            .textures
            .get(&texture)
            .and_then(|(_, frame)| frame.as_ref())
            .map(|frame| frame.pixel(0, 0))
    }
}

impl GraphicsDevice for FakeDevice {
    fn create_context(&mut self, _shared: Option<ContextId>) -> Result<ContextId, CaptureError> {
        let mut state = self.state.lock();
        if state.fail_context {
            return Err(CaptureError::ContextCreation("no matching config".into()));
        }
        state.live_contexts += 1;
        Ok(ContextId(state.next_id()))
    }

    fn destroy_context(&mut self, _context: ContextId) {
        self.state.lock().live_contexts -= 1;
    }

    fn create_offscreen_surface(
        &mut self,
        _context: ContextId,
        _width: u32,
        _height: u32,
    ) -> Result<SurfaceId, CaptureError> {
        let mut state = self.state.lock();
        state.live_surfaces += 1;
        Ok(SurfaceId(state.next_id()))
    }

    fn create_window_surface(&mut self, _context: ContextId, input: &EncoderInput) -> Result<SurfaceId, CaptureError> {
        let mut state = self.state.lock();
        state.live_surfaces += 1;
        let id = SurfaceId(state.next_id());
        state.windows.insert(id, (input.clone(), 0));
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let mut state = self.state.lock();
        state.live_surfaces -= 1;
        state.windows.remove(&surface);
        state.content.remove(&surface);
    }

    fn make_current(&mut self, _context: ContextId, surface: Option<SurfaceId>) -> Result<(), CaptureError> {
        self.state.lock().current = surface;
        Ok(())
    }

    fn set_presentation_time(&mut self, surface: SurfaceId, nanos: i64) {
        if let Some(window) = self.state.lock().windows.get_mut(&surface) {
            window.1 = nanos;
        }
    }

    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CaptureError> {
        let (sink, frame, pts) = {
            let mut state = self.state.lock();
            state.swaps += 1;
            let Some((input, pts)) = state.windows.get(&surface) else {
                return Ok(());
            };
            let frame = state
                .content
                .get(&surface)
                .cloned()
                .unwrap_or_else(|| VideoFrame::solid(input.width, input.height, 0, *pts));
            (Arc::clone(&input.sink), frame, *pts)
        };
        sink.queue_frame(frame, pts);
        Ok(())
    }

    fn create_texture(&mut self, target: TextureTarget) -> TextureId {
        let mut state = self.state.lock();
        state.live_textures += 1;
        let id = TextureId(state.next_id());
        state.textures.insert(id, (target, None));
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture).is_some() {
            state.live_textures -= 1;
        }
    }

    fn latch_external_image(&mut self, texture: TextureId, frame: &VideoFrame) -> TransformMatrix {
        if let Some(entry) = self.state.lock().textures.get_mut(&texture) {
            entry.1 = Some(frame.clone());
        }
        TransformMatrix::FLIP_VERTICAL
    }

    fn create_program(&mut self, _kind: ProgramKind) -> Result<ProgramId, CaptureError> {
        let mut state = self.state.lock();
        state.live_programs += 1;
        Ok(ProgramId(state.next_id()))
    }

    fn delete_program(&mut self, _program: ProgramId) {
        self.state.lock().live_programs -= 1;
    }

    fn draw_quad(&mut self, _program: ProgramId, texture: TextureId, _mvp: &TransformMatrix, _tex: &TransformMatrix) {
        let mut state = self.state.lock();
        if let Some(code) = state.fail_draw {
            state.pending_error = code;
            return;
        }
        state.draws += 1;
        let frame = state.textures.get(&texture).and_then(|(_, frame)| frame.clone());
        if let (Some(current), Some(frame)) = (state.current, frame) {
            state.content.insert(current, frame);
        }
    }

    fn clear(&mut self, _rgba: [f32; 4]) {}

    fn flush(&mut self) {}

    fn get_error(&mut self) -> u32 {
        std::mem::replace(&mut self.state.lock().pending_error, NO_ERROR)
    }
}

/// Encoder input sink that only records presentation times.
#[derive(Debug, Clone, Default)]
pub struct FrameCollector {
    timestamps: Arc<Mutex<Vec<i64>>>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoder_input(&self, width: u32, height: u32) -> EncoderInput {
        EncoderInput {
            width,
            height,
            sink: Arc::new(self.clone()),
        }
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.timestamps.lock().clone()
    }
}

impl InputSurfaceSink for FrameCollector {
    fn queue_frame(&self, _frame: VideoFrame, presentation_time_ns: i64) {
        self.timestamps.lock().push(presentation_time_ns);
    }
}

// --- Encoders -------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeEncoderState {
    pub configured: Option<MediaFormat>,
    pub started: bool,
    pub stopped: bool,
    pub released: bool,
    pub inputs: u64,
    pub fail_configure: bool,
    outputs: VecDeque<EncodedSample>,
    format_reported: bool,
    end_of_input: bool,
    end_reported: bool,
}

/// Encoder that turns every input into one sample carrying its timestamp.
/// Serves as both the video and the audio encoder.
#[derive(Debug, Clone, Default)]
pub struct FakeEncoder {
    state: Arc<Mutex<FakeEncoderState>>,
}

struct FakeEncoderSink(Arc<Mutex<FakeEncoderState>>);

impl InputSurfaceSink for FakeEncoderSink {
    fn queue_frame(&self, frame: VideoFrame, presentation_time_ns: i64) {
        let mut state = self.0.lock();
        state.inputs += 1;
        let sample = EncodedSample::new(
            TrackType::Video,
            presentation_time_ns / 1000,
            frame.pixel(0, 0).to_le_bytes().to_vec(),
        );
        state.outputs.push_back(sample);
    }
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<Mutex<FakeEncoderState>> {
        Arc::clone(&self.state)
    }
}

impl Encoder for FakeEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.fail_configure {
            return Err(CaptureError::DeviceNotAvailable);
        }
        state.configured = Some(format.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.state.lock().started = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<EncoderOutput, CaptureError> {
        let mut state = self.state.lock();
        if !state.started {
            return Ok(EncoderOutput::TryAgainLater);
        }
        if !state.format_reported {
            state.format_reported = true;
            let format = state.configured.clone().ok_or(CaptureError::EncodingFailed("not configured".into()))?;
            return Ok(EncoderOutput::FormatChanged(format));
        }
        if let Some(sample) = state.outputs.pop_front() {
            return Ok(EncoderOutput::Sample(sample));
        }
        if state.end_of_input && !state.end_reported {
            state.end_reported = true;
            return Ok(EncoderOutput::EndOfStream);
        }
        Ok(EncoderOutput::TryAgainLater)
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.started = false;
        state.stopped = true;
    }

    fn release(&mut self) {
        self.state.lock().released = true;
    }
}

impl VideoEncoder for FakeEncoder {
    fn create_input_surface(&mut self) -> Result<EncoderInput, CaptureError> {
        let (width, height) = match self.state.lock().configured {
            Some(MediaFormat::Video { width, height, .. }) => (width, height),
            _ => return Err(CaptureError::EncodingFailed("not configured for video".into())),
        };
        Ok(EncoderInput {
            width,
            height,
            sink: Arc::new(FakeEncoderSink(Arc::clone(&self.state))),
        })
    }

    fn signal_end_of_input_stream(&mut self) -> Result<(), CaptureError> {
        self.state.lock().end_of_input = true;
        Ok(())
    }
}

impl AudioEncoder for FakeEncoder {
    fn queue_input(&mut self, pcm: &[u8], presentation_time_us: i64, end_of_stream: bool) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.inputs += 1;
        if !pcm.is_empty() {
            let sample = EncodedSample::new(TrackType::Audio, presentation_time_us, pcm.to_vec());
            state.outputs.push_back(sample);
        }
        state.end_of_input |= end_of_stream;
        Ok(())
    }
}

// --- Sources --------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeDisplayState {
    pub target: Option<SourceSurface>,
    pub params: Option<DisplayParams>,
    pub released: bool,
    pub fail_create: bool,
}

/// Virtual display driven by the test through [`FakeDisplay::push`].
#[derive(Debug, Clone, Default)]
pub struct FakeDisplay {
    state: Arc<Mutex<FakeDisplayState>>,
}

impl FakeDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<Mutex<FakeDisplayState>> {
        Arc::clone(&self.state)
    }

    pub fn push(&self, rgba: u32, timestamp_ns: i64) -> Result<(), CaptureError> {
        let target = self.state.lock().target.clone().ok_or(CaptureError::DeviceNotAvailable)?;
        target.push_frame(VideoFrame::solid(target.width(), target.height(), rgba, timestamp_ns))
    }
}

impl VirtualDisplay for FakeDisplay {
    fn create(&mut self, params: &DisplayParams, target: SourceSurface) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(CaptureError::PermissionDenied);
        }
        state.params = Some(params.clone());
        state.target = Some(target);
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.target = None;
        state.released = true;
    }
}

/// Audio input whose callback the test invokes through [`FakeAudioInput::deliver`].
#[derive(Clone, Default)]
pub struct FakeAudioInput {
    callback: Arc<Mutex<Option<AudioBufferCallback>>>,
    fail_start: Arc<Mutex<bool>>,
}

impl FakeAudioInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, samples: &[f32], sample_rate: f64, channels: u16) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(samples, sample_rate, channels);
        }
    }

    pub fn is_started(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Make the next `start` fail with `DeviceNotAvailable`.
    pub fn fail_start(&self) {
        *self.fail_start.lock() = true;
    }
}

impl AudioInput for FakeAudioInput {
    fn is_available(&self) -> bool {
        true
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError> {
        if *self.fail_start.lock() {
            return Err(CaptureError::DeviceNotAvailable);
        }
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        *self.callback.lock() = None;
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: "fake".into(),
            name: "Fake Input".into(),
            is_default: true,
        }
    }
}

// --- Container & delegate -------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryContainer {
    pub tracks: Vec<MediaFormat>,
    pub samples: Vec<(usize, EncodedSample)>,
    pub started: bool,
    pub finished: u32,
}

/// Container writer keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    contents: Arc<Mutex<MemoryContainer>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Arc<Mutex<MemoryContainer>> {
        Arc::clone(&self.contents)
    }
}

impl ContainerWriter for MemoryWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, CaptureError> {
        let mut contents = self.contents.lock();
        contents.tracks.push(format.clone());
        Ok(contents.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.contents.lock().started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<(), CaptureError> {
        self.contents.lock().samples.push((track, sample.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<MuxSummary, CaptureError> {
        let mut contents = self.contents.lock();
        contents.finished += 1;
        let mut samples_per_track = vec![0u64; contents.tracks.len()];
        for (track, _) in &contents.samples {
            samples_per_track[*track] += 1;
        }
        Ok(MuxSummary {
            path: PathBuf::from("memory"),
            bytes_written: contents.samples.iter().map(|(_, s)| s.payload.len() as u64).sum(),
            samples_per_track,
            checksum: String::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    State(SessionState),
    Prepared(TrackType),
    Stopped(TrackType),
    Error(CaptureError),
    Finished(PathBuf),
}

/// Delegate recording every callback in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<DelegateEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DelegateEvent::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl RecorderDelegate for EventLog {
    fn on_state_changed(&self, state: &SessionState) {
        self.events.lock().push(DelegateEvent::State(state.clone()));
    }

    fn on_task_prepared(&self, track: TrackType) {
        self.events.lock().push(DelegateEvent::Prepared(track));
    }

    fn on_task_stopped(&self, track: TrackType) {
        self.events.lock().push(DelegateEvent::Stopped(track));
    }

    fn on_error(&self, error: &CaptureError) {
        self.events.lock().push(DelegateEvent::Error(error.clone()));
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        self.events.lock().push(DelegateEvent::Finished(result.file_path.clone()));
    }
}

// --- Backend --------------------------------------------------------------

/// Backend handing out clones of shared fakes so tests can inspect them.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    pub device: FakeDevice,
    pub video: FakeEncoder,
    pub audio: FakeEncoder,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBackend for FakeBackend {
    type Graphics = FakeDevice;
    type Video = FakeEncoder;
    type Audio = FakeEncoder;

    fn graphics_device(&self) -> Result<FakeDevice, CaptureError> {
        Ok(self.device.clone())
    }

    fn video_encoder(&self) -> Result<FakeEncoder, CaptureError> {
        Ok(self.video.clone())
    }

    fn audio_encoder(&self) -> Result<FakeEncoder, CaptureError> {
        Ok(self.audio.clone())
    }
}
