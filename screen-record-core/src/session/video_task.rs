use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::task::{
    prepare_error, EncodeTask, TaskContext, TaskCounters, TrackOutput, END_OF_STREAM_DEADLINE, PREPARE_TIMEOUT,
};
use crate::gpu::context::GpuContext;
use crate::gpu::relay::FrameRelay;
use crate::gpu::source::SourceTexture;
use crate::gpu::surface::RenderSurface;
use crate::models::config::{PausePolicy, RecordingConfig};
use crate::models::error::CaptureError;
use crate::models::media::TrackType;
use crate::models::recording_result::VideoCounters;
use crate::models::state::TaskState;
use crate::processing::signal::CaptureSignal;
use crate::traits::display::{DisplayParams, VirtualDisplay};
use crate::traits::encoder::{Encoder, EncoderInput, VideoEncoder};
use crate::traits::graphics::{GraphicsDevice, ProgramKind};

const DISPLAY_NAME: &str = "screen-record";

/// GPU objects of one video task, created and destroyed on its render thread.
///
/// Fields fill in creation order; [`RenderPipeline::release`] frees whatever
/// exists in reverse order.
struct RenderPipeline<G: GraphicsDevice> {
    context: GpuContext<G>,
    encoder_surface: Option<RenderSurface>,
    idle_surface: Option<RenderSurface>,
    relay: Option<FrameRelay>,
    source: Option<SourceTexture>,
}

impl<G: GraphicsDevice> RenderPipeline<G> {
    /// Build the relay from the encoder input to a source surface and start
    /// the virtual display mirroring into it.
    fn create(
        device: G,
        input: &EncoderInput,
        config: &RecordingConfig,
        signal: &Arc<CaptureSignal>,
        display: &mut dyn VirtualDisplay,
    ) -> Result<Self, CaptureError> {
        let context = GpuContext::create(device, None)?;
        let mut pipeline = Self {
            context,
            encoder_surface: None,
            idle_surface: None,
            relay: None,
            source: None,
        };
        match pipeline.build(input, config, signal, display) {
            Ok(()) => Ok(pipeline),
            Err(e) => {
                pipeline.release();
                Err(e)
            }
        }
    }

    fn build(
        &mut self,
        input: &EncoderInput,
        config: &RecordingConfig,
        signal: &Arc<CaptureSignal>,
        display: &mut dyn VirtualDisplay,
    ) -> Result<(), CaptureError> {
        let ctx = &mut self.context;
        let encoder_surface = self.encoder_surface.insert(RenderSurface::from_encoder_input(ctx, input)?);
        encoder_surface.make_current(ctx)?;
        self.idle_surface = Some(RenderSurface::offscreen(ctx, 1, 1)?);

        let relay = self.relay.insert(FrameRelay::new(ctx, ProgramKind::TextureExternal)?);
        let texture = relay.create_source_texture(ctx)?;
        let (source, surface) = SourceTexture::new(texture, config.width, config.height, Arc::clone(signal));
        self.source = Some(source);

        let params = DisplayParams {
            name: DISPLAY_NAME.to_string(),
            width: config.width,
            height: config.height,
            density: config.density,
        };
        display.create(&params, surface)
    }

    /// Latch the pending source frame. Returns whether one was latched.
    fn latch(&mut self) -> Result<bool, CaptureError> {
        match self.source.as_mut() {
            Some(source) => source.update_tex_image(&mut self.context),
            None => Err(CaptureError::UseAfterRelease("source texture")),
        }
    }

    fn discard_pending(&mut self) -> bool {
        self.source.as_mut().is_some_and(SourceTexture::discard_pending)
    }

    /// Draw the source texture into the encoder surface and submit it.
    fn present(&mut self, presentation_time_ns: i64) -> Result<(), CaptureError> {
        let (Some(surface), Some(relay), Some(source)) = (&self.encoder_surface, &self.relay, &self.source) else {
            return Err(CaptureError::UseAfterRelease("video pipeline"));
        };
        let ctx = &mut self.context;
        surface.make_current(ctx)?;
        relay.draw_frame(ctx, source.texture(), &source.transform_matrix())?;
        surface.set_presentation_time(ctx, presentation_time_ns)?;
        surface.swap_buffers(ctx)
    }

    /// Park the context on the idle surface and clear it so nothing queues up.
    fn idle(&mut self) -> Result<(), CaptureError> {
        let Some(idle) = &self.idle_surface else {
            return Err(CaptureError::UseAfterRelease("idle surface"));
        };
        idle.make_current(&mut self.context)?;
        self.context.clear_and_flush()
    }

    /// Stop accepting source frames.
    fn detach_source(&mut self) {
        if let Some(source) = &self.source {
            source.release_surface();
        }
    }

    fn release(mut self) -> G {
        let ctx = &mut self.context;
        if let Some(mut source) = self.source.take() {
            source.release(ctx);
        }
        if let Some(mut relay) = self.relay.take() {
            relay.release(ctx);
        }
        if let Some(mut surface) = self.encoder_surface.take() {
            surface.release(ctx);
        }
        if let Some(mut surface) = self.idle_surface.take() {
            surface.release(ctx);
        }
        self.context.release()
    }
}

/// State shared between a [`VideoTask`] and its render thread.
#[derive(Clone)]
struct RenderShared {
    config: RecordingConfig,
    ctx: TaskContext,
    signal: Arc<CaptureSignal>,
    counters: Arc<Mutex<VideoCounters>>,
    state: Arc<Mutex<TaskState>>,
}

impl RenderShared {
    fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    fn run<G: GraphicsDevice, E: VideoEncoder>(
        self,
        device: G,
        mut encoder: E,
        mut display: Box<dyn VirtualDisplay>,
        ready: Sender<Result<(), CaptureError>>,
        start: Receiver<bool>,
    ) {
        let mut pipeline = match self.prepare(device, &mut encoder, display.as_mut()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                encoder.release();
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        let mut output = TrackOutput::new(TrackType::Video, self.ctx.clone());

        if start.recv() == Ok(true) {
            self.set_state(TaskState::Capturing);
            log::info!(
                "video capture started: {}x{} @ {} fps",
                self.config.width,
                self.config.height,
                self.config.frame_rate
            );
            if let Err(e) = self.record(&mut pipeline, &mut encoder, &mut output) {
                log::error!("video task failed: {}", e);
                self.ctx.fail(e);
            }
        }

        self.set_state(TaskState::Stopping);
        display.release();
        pipeline.detach_source();
        if let Err(e) = encoder
            .signal_end_of_input_stream()
            .and_then(|_| output.drain_to_end(&mut encoder, END_OF_STREAM_DEADLINE))
        {
            log::warn!("video encoder drain failed: {}", e);
        }
        drop(pipeline.release());
        encoder.stop();
        encoder.release();
        output.finish();

        let counters = *self.counters.lock();
        log::info!(
            "video task stopped: {} fresh, {} filler, {} submitted, {} muxed",
            counters.fresh_frames,
            counters.filler_frames,
            counters.frames_submitted,
            output.samples_written()
        );
        self.set_state(TaskState::Stopped);
        self.ctx.notify_stopped(TrackType::Video);
    }

    fn prepare<G: GraphicsDevice, E: VideoEncoder>(
        &self,
        device: G,
        encoder: &mut E,
        display: &mut dyn VirtualDisplay,
    ) -> Result<RenderPipeline<G>, CaptureError> {
        encoder.configure(&self.config.video_format())?;
        let input = encoder.create_input_surface()?;
        let mut pipeline = RenderPipeline::create(device, &input, &self.config, &self.signal, display)?;
        if let Err(e) = encoder.start() {
            display.release();
            drop(pipeline.release());
            return Err(e);
        }
        // Leave the encoder surface unbound until the first frame.
        if let Err(e) = pipeline.idle() {
            display.release();
            drop(pipeline.release());
            encoder.stop();
            return Err(e);
        }
        Ok(pipeline)
    }

    /// Frame loop: wake on a new source frame or after one frame interval,
    /// latch, present, then park on the idle surface and drain the encoder.
    fn record<G: GraphicsDevice, E: VideoEncoder>(
        &self,
        pipeline: &mut RenderPipeline<G>,
        encoder: &mut E,
        output: &mut TrackOutput,
    ) -> Result<(), CaptureError> {
        let interval = self.config.frame_interval();
        let clock = self.ctx.clock();
        loop {
            let wake = self.signal.wait(interval);
            if !wake.capturing {
                return Ok(());
            }

            let fresh = if wake.paused {
                if pipeline.discard_pending() {
                    log::trace!("discarded source frame while paused");
                }
                false
            } else {
                pipeline.latch()?
            };

            let present = !wake.paused || self.config.pause_policy == PausePolicy::HoldLastFrame;
            if present {
                pipeline.present(clock.now_ns())?;
                let mut counters = self.counters.lock();
                counters.frames_submitted += 1;
                if fresh {
                    counters.fresh_frames += 1;
                } else {
                    counters.filler_frames += 1;
                }
            }

            pipeline.idle()?;
            output.drain(encoder, Duration::ZERO)?;
        }
    }
}

/// Mirrors a virtual display through the frame relay into a video encoder.
///
/// All graphics work happens on one render thread spawned by `prepare`;
/// this handle only flips flags and waits for that thread.
pub struct VideoTask<G: GraphicsDevice, E: VideoEncoder> {
    shared: RenderShared,
    parts: Option<(G, E, Box<dyn VirtualDisplay>)>,
    start_tx: Option<Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<G: GraphicsDevice, E: VideoEncoder> VideoTask<G, E> {
    pub fn new(
        device: G,
        encoder: E,
        display: Box<dyn VirtualDisplay>,
        config: RecordingConfig,
        ctx: TaskContext,
    ) -> Self {
        Self {
            shared: RenderShared {
                config,
                ctx,
                signal: Arc::new(CaptureSignal::new()),
                counters: Arc::new(Mutex::new(VideoCounters::default())),
                state: Arc::new(Mutex::new(TaskState::Idle)),
            },
            parts: Some((device, encoder, display)),
            start_tx: None,
            handle: None,
        }
    }

    pub fn video_counters(&self) -> VideoCounters {
        *self.shared.counters.lock()
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("video render thread panicked");
            }
        }
    }
}

impl<G: GraphicsDevice, E: VideoEncoder> EncodeTask for VideoTask<G, E> {
    fn track_type(&self) -> TrackType {
        TrackType::Video
    }

    fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        let Some((device, encoder, display)) = self.parts.take() else {
            return Err(CaptureError::Prepare("video task already prepared".into()));
        };
        self.shared.set_state(TaskState::Preparing);

        let (ready_tx, ready_rx) = mpsc::channel();
        let (start_tx, start_rx) = mpsc::channel();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("video-encoder".into())
            .spawn(move || shared.run(device, encoder, display, ready_tx, start_rx))
            .map_err(|e| CaptureError::Prepare(format!("failed to spawn render thread: {}", e)))?;
        self.handle = Some(handle);

        let outcome = ready_rx
            .recv_timeout(PREPARE_TIMEOUT)
            .unwrap_or_else(|_| Err(CaptureError::Prepare("render thread did not report readiness".into())));
        match outcome {
            Ok(()) => {
                self.start_tx = Some(start_tx);
                log::info!("video task prepared");
                self.shared.ctx.notify_prepared(TrackType::Video);
                Ok(())
            }
            Err(e) => {
                drop(start_tx);
                self.join();
                self.shared.set_state(TaskState::Stopped);
                Err(prepare_error(TrackType::Video, e))
            }
        }
    }

    fn start_capturing(&mut self) -> Result<(), CaptureError> {
        let Some(start_tx) = &self.start_tx else {
            log::debug!("video task not prepared, ignoring start");
            return Ok(());
        };
        self.shared.signal.start_capturing();
        start_tx
            .send(true)
            .map_err(|_| CaptureError::EncodingFailed("video render thread exited".into()))
    }

    fn pause(&mut self) {
        if self.shared.signal.set_paused(true) {
            self.shared.set_state(TaskState::Paused);
        }
    }

    fn resume(&mut self) {
        if self.shared.signal.set_paused(false) {
            self.shared.set_state(TaskState::Capturing);
        }
    }

    fn stop(&mut self) {
        self.shared.signal.stop_capturing();
        if let Some(start_tx) = self.start_tx.take() {
            let _ = start_tx.send(false);
        }
        self.join();
    }

    fn counters(&self) -> TaskCounters {
        TaskCounters::Video(self.video_counters())
    }
}

impl<G: GraphicsDevice, E: VideoEncoder> Drop for VideoTask<G, E> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::SessionState;
    use crate::processing::clock::SessionClock;
    use crate::session::muxer::Multiplexer;
    use crate::test_support::{EventLog, FakeDevice, FakeDisplay, FakeEncoder, MemoryWriter};
    use crate::traits::graphics::INVALID_OPERATION;
    use crate::traits::recorder_delegate::RecorderDelegate;
    use std::time::Instant;

    struct Harness {
        task: VideoTask<FakeDevice, FakeEncoder>,
        device: FakeDevice,
        encoder: FakeEncoder,
        display: FakeDisplay,
        state: Arc<Mutex<SessionState>>,
        writer: MemoryWriter,
        log: Arc<EventLog>,
    }

    fn harness(config: RecordingConfig) -> Harness {
        let device = FakeDevice::new();
        let encoder = FakeEncoder::new();
        let display = FakeDisplay::new();
        let writer = MemoryWriter::new();
        let state = Arc::new(Mutex::new(SessionState::Recording));
        let log = EventLog::new();
        let delegate: Arc<dyn RecorderDelegate> = log.clone();
        let muxer = Arc::new(Mutex::new(Multiplexer::new(Box::new(writer.clone()), 1, 64)));
        let ctx = TaskContext::new(muxer, Arc::clone(&state), Some(delegate), SessionClock::start());
        let task = VideoTask::new(
            device.clone(),
            encoder.clone(),
            Box::new(display.clone()),
            config,
            ctx,
        );
        Harness {
            task,
            device,
            encoder,
            display,
            state,
            writer,
            log,
        }
    }

    fn small_config() -> RecordingConfig {
        RecordingConfig {
            width: 64,
            height: 32,
            ..Default::default()
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn assert_released(h: &Harness) {
        let gpu = h.device.probe();
        let gpu = gpu.lock();
        assert_eq!(gpu.live_contexts, 0);
        assert_eq!(gpu.live_surfaces, 0);
        assert_eq!(gpu.live_textures, 0);
        assert_eq!(gpu.live_programs, 0);
        assert!(h.display.probe().lock().released);
        assert!(h.encoder.probe().lock().released);
    }

    #[test]
    fn prepare_creates_display_at_configured_size() {
        let mut h = harness(small_config());
        h.task.prepare().unwrap();
        assert_eq!(h.task.state(), TaskState::Preparing);
        {
            let display = h.display.probe();
            let display = display.lock();
            let params = display.params.as_ref().unwrap();
            assert_eq!((params.width, params.height, params.density), (64, 32, 320));
        }
        assert!(h.encoder.probe().lock().started);
        assert_eq!(h.device.probe().lock().live_surfaces, 2);

        h.task.stop();
        assert_eq!(h.task.state(), TaskState::Stopped);
        assert_released(&h);
    }

    #[test]
    fn fresh_frames_are_drawn_and_filler_keeps_cadence() {
        let mut h = harness(small_config());
        h.task.prepare().unwrap();
        h.task.start_capturing().unwrap();

        for (i, color) in [0x11, 0x22, 0x33].into_iter().enumerate() {
            h.display.push(color, i as i64 * 40_000_000).unwrap();
            let expected = i as u64 + 1;
            assert!(wait_until(Duration::from_secs(2), || h.task.video_counters().fresh_frames >= expected));
        }
        assert!(wait_until(Duration::from_secs(2), || h.task.video_counters().filler_frames >= 2));
        h.task.stop();

        let counters = h.task.video_counters();
        assert_eq!(counters.fresh_frames, 3);
        assert_eq!(counters.frames_submitted, counters.fresh_frames + counters.filler_frames);
        assert_eq!(h.encoder.probe().lock().inputs, counters.frames_submitted);

        let contents = h.writer.contents();
        let contents = contents.lock();
        assert_eq!(contents.finished, 1);
        assert_eq!(contents.samples.len() as u64, counters.frames_submitted);
        let pts: Vec<i64> = contents.samples.iter().map(|(_, s)| s.presentation_time_us).collect();
        assert!(pts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(pts[0], 0);
        drop(contents);
        assert_released(&h);
    }

    #[test]
    fn paused_hold_last_frame_emits_filler_only() {
        let mut h = harness(small_config());
        h.task.prepare().unwrap();
        h.task.start_capturing().unwrap();
        h.display.push(0x44, 0).unwrap();
        assert!(wait_until(Duration::from_secs(2), || h.task.video_counters().fresh_frames == 1));

        h.task.pause();
        assert_eq!(h.task.state(), TaskState::Paused);
        thread::sleep(Duration::from_millis(60));
        let before = h.task.video_counters();
        h.display.push(0x55, 1).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            h.task.video_counters().filler_frames >= before.filler_frames + 3
        }));
        assert_eq!(h.task.video_counters().fresh_frames, 1);

        h.task.resume();
        h.display.push(0x66, 2).unwrap();
        assert!(wait_until(Duration::from_secs(2), || h.task.video_counters().fresh_frames == 2));
        h.task.stop();
        assert_released(&h);
    }

    #[test]
    fn paused_freeze_submits_nothing() {
        let mut h = harness(RecordingConfig {
            pause_policy: PausePolicy::Freeze,
            ..small_config()
        });
        h.task.prepare().unwrap();
        h.task.start_capturing().unwrap();
        assert!(wait_until(Duration::from_secs(2), || h.task.video_counters().frames_submitted >= 1));

        h.task.pause();
        // Let an in-flight iteration finish before sampling.
        thread::sleep(Duration::from_millis(60));
        let before = h.task.video_counters().frames_submitted;
        h.display.push(0x77, 0).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(h.task.video_counters().frames_submitted, before);
        h.task.stop();
        assert_released(&h);
    }

    #[test]
    fn graphics_error_fails_session_and_releases() {
        let mut h = harness(small_config());
        h.task.prepare().unwrap();
        h.device.probe().lock().fail_draw = Some(INVALID_OPERATION);
        h.task.start_capturing().unwrap();

        assert!(wait_until(Duration::from_secs(2), || h.task.state() == TaskState::Stopped));
        let expected = CaptureError::GraphicsOperation {
            op: "draw_frame".into(),
            code: INVALID_OPERATION,
        };
        assert_eq!(*h.state.lock(), SessionState::Failed(expected.clone()));
        assert!(h.log.errors().contains(&expected));
        h.task.stop();
        assert_released(&h);
    }

    #[test]
    fn prepare_failure_leaves_nothing_allocated() {
        let mut h = harness(small_config());
        h.display.probe().lock().fail_create = true;
        let err = h.task.prepare().unwrap_err();
        assert!(matches!(err, CaptureError::Prepare(ref msg) if msg.contains("permission denied")));
        let gpu = h.device.probe();
        assert_eq!(gpu.lock().live_surfaces, 0);
        assert_eq!(gpu.lock().live_contexts, 0);
        assert!(h.encoder.probe().lock().released);
        assert!(h.task.prepare().is_err());
    }

    #[test]
    fn stop_before_start_tears_down() {
        let mut h = harness(small_config());
        h.task.stop();
        assert_eq!(h.task.state(), TaskState::Idle);

        h.task.prepare().unwrap();
        h.task.stop();
        h.task.stop();
        assert_eq!(h.task.video_counters().frames_submitted, 0);
        assert_released(&h);
    }
}
