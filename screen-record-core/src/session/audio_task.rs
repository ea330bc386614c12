use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::task::{prepare_error, EncodeTask, TaskContext, TaskCounters, TrackOutput, END_OF_STREAM_DEADLINE};
use crate::models::config::RecordingConfig;
use crate::models::error::CaptureError;
use crate::models::media::TrackType;
use crate::models::recording_result::AudioCounters;
use crate::models::state::TaskState;
use crate::processing::pcm::{self, PcmConverter};
use crate::processing::ring_buffer::RingBuffer;
use crate::processing::signal::CaptureSignal;
use crate::traits::audio_input::{AudioBufferCallback, AudioInput};
use crate::traits::encoder::AudioEncoder;

/// Seconds of converted audio the staging buffer holds.
const BUFFER_SECONDS: usize = 2;

/// Presentation time of the next chunk, from the number of frames consumed
/// since capture started.
#[derive(Debug, Clone, Copy)]
struct AudioTimeline {
    anchor_us: i64,
    frames: u64,
    sample_rate: u32,
}

impl AudioTimeline {
    fn pts_us(&self) -> i64 {
        self.anchor_us + (self.frames as i128 * 1_000_000 / self.sample_rate.max(1) as i128) as i64
    }

    fn advance(&mut self, frames: u64) {
        self.frames += frames;
    }
}

/// Frames discarded while paused, placed after the `before` staged
/// samples that were captured ahead of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gap {
    before: usize,
    frames: u64,
}

#[derive(Debug, PartialEq)]
enum Piece {
    Samples(Vec<f32>),
    Gap(u64),
}

/// Converted input waiting for the encoder thread, in capture order.
///
/// Whether input is paused is decided by the callback when the samples
/// arrive, so a pause never reaches back into audio captured before it.
#[derive(Debug)]
struct Staging {
    samples: RingBuffer,
    gaps: VecDeque<Gap>,
}

impl Staging {
    fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
            gaps: VecDeque::new(),
        }
    }

    fn push(&mut self, samples: &[f32]) {
        let dropped = self.samples.dropped();
        self.samples.write(samples);
        let lost = (self.samples.dropped() - dropped) as usize;
        if lost > 0 {
            for gap in &mut self.gaps {
                gap.before = gap.before.saturating_sub(lost);
            }
            log::warn!("audio buffer overflow, {} samples dropped so far", self.samples.dropped());
        }
    }

    fn discard(&mut self, frames: u64) {
        let before = self.samples.count();
        match self.gaps.back_mut() {
            Some(gap) if gap.before == before => gap.frames += frames,
            _ => self.gaps.push_back(Gap { before, frames }),
        }
    }

    /// Next piece in capture order: a full chunk, the samples left ahead of
    /// a gap, or the gap itself. `None` while less than a chunk is staged.
    fn next_piece(&mut self, chunk_len: usize) -> Option<Piece> {
        let ready = self.gaps.front().map_or(self.samples.count(), |gap| gap.before);
        if ready >= chunk_len || (ready > 0 && !self.gaps.is_empty()) {
            let samples = self.samples.read(ready.min(chunk_len));
            for gap in &mut self.gaps {
                gap.before -= samples.len();
            }
            return Some(Piece::Samples(samples));
        }
        self.gaps.pop_front().map(|gap| Piece::Gap(gap.frames))
    }
}

#[derive(Clone)]
struct AudioShared {
    config: RecordingConfig,
    ctx: TaskContext,
    signal: Arc<CaptureSignal>,
    staging: Arc<Mutex<Staging>>,
    counters: Arc<Mutex<AudioCounters>>,
    state: Arc<Mutex<TaskState>>,
}

impl AudioShared {
    fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    fn run<E: AudioEncoder>(self, mut encoder: E, start: Receiver<bool>) {
        let mut output = TrackOutput::new(TrackType::Audio, self.ctx.clone());
        let mut timeline = AudioTimeline {
            anchor_us: 0,
            frames: 0,
            sample_rate: self.config.sample_rate,
        };

        if start.recv() == Ok(true) {
            self.set_state(TaskState::Capturing);
            timeline.anchor_us = self.ctx.clock().now_us();
            log::info!(
                "audio capture started: {} Hz, {} ch",
                self.config.sample_rate,
                self.config.channels
            );
            if let Err(e) = self.record(&mut encoder, &mut output, &mut timeline) {
                log::error!("audio task failed: {}", e);
                self.ctx.fail(e);
            }
        }

        self.set_state(TaskState::Stopping);
        if let Err(e) = self
            .finish_input(&mut encoder, &mut timeline)
            .and_then(|_| output.drain_to_end(&mut encoder, END_OF_STREAM_DEADLINE))
        {
            log::warn!("audio encoder drain failed: {}", e);
        }
        encoder.stop();
        encoder.release();
        output.finish();

        let counters = *self.counters.lock();
        log::info!(
            "audio task stopped: {} chunks, {} frames encoded, {} discarded",
            counters.chunks_encoded,
            counters.frames_encoded,
            counters.frames_discarded
        );
        self.set_state(TaskState::Stopped);
        self.ctx.notify_stopped(TrackType::Audio);
    }

    fn chunk_len(&self) -> usize {
        self.config.samples_per_frame * self.config.channels.max(1) as usize
    }

    fn record<E: AudioEncoder>(
        &self,
        encoder: &mut E,
        output: &mut TrackOutput,
        timeline: &mut AudioTimeline,
    ) -> Result<(), CaptureError> {
        let chunk_len = self.chunk_len();
        let chunk_duration =
            Duration::from_secs_f64(self.config.samples_per_frame as f64 / self.config.sample_rate.max(1) as f64);
        loop {
            let wake = self.signal.wait(chunk_duration);
            while let Some(piece) = self.take_piece(chunk_len) {
                self.apply(encoder, piece, timeline)?;
            }
            output.drain(encoder, Duration::ZERO)?;
            if !wake.capturing {
                return Ok(());
            }
        }
    }

    fn take_piece(&self, chunk_len: usize) -> Option<Piece> {
        self.staging.lock().next_piece(chunk_len)
    }

    fn apply<E: AudioEncoder>(
        &self,
        encoder: &mut E,
        piece: Piece,
        timeline: &mut AudioTimeline,
    ) -> Result<(), CaptureError> {
        match piece {
            Piece::Samples(samples) => self.encode_chunk(encoder, &samples, false, timeline),
            Piece::Gap(frames) => {
                timeline.advance(frames);
                self.counters.lock().frames_discarded += frames;
                log::trace!("skipped {} audio frames captured while paused", frames);
                Ok(())
            }
        }
    }

    /// Queue what is left in the buffer as the final, end-of-stream input.
    fn finish_input<E: AudioEncoder>(&self, encoder: &mut E, timeline: &mut AudioTimeline) -> Result<(), CaptureError> {
        let chunk_len = self.chunk_len();
        while let Some(piece) = self.take_piece(chunk_len) {
            self.apply(encoder, piece, timeline)?;
        }
        let rest = {
            let mut staging = self.staging.lock();
            let count = staging.samples.count();
            staging.samples.read(count)
        };
        self.encode_chunk(encoder, &rest, true, timeline)
    }

    fn encode_chunk<E: AudioEncoder>(
        &self,
        encoder: &mut E,
        samples: &[f32],
        end_of_stream: bool,
        timeline: &mut AudioTimeline,
    ) -> Result<(), CaptureError> {
        let frames = (samples.len() / self.config.channels.max(1) as usize) as u64;
        let pts = timeline.pts_us();
        timeline.advance(frames);
        encoder.queue_input(&pcm::to_int16_le(samples), pts, end_of_stream)?;
        if frames > 0 {
            let mut counters = self.counters.lock();
            counters.chunks_encoded += 1;
            counters.frames_encoded += frames;
        }
        Ok(())
    }
}

/// Captures an audio input, converts it to the configured PCM layout and
/// feeds an audio encoder from one dedicated thread.
pub struct AudioTask<E: AudioEncoder> {
    shared: AudioShared,
    encoder: Option<E>,
    input: Box<dyn AudioInput>,
    input_started: bool,
    start_tx: Option<Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<E: AudioEncoder> AudioTask<E> {
    pub fn new(encoder: E, input: Box<dyn AudioInput>, config: RecordingConfig, ctx: TaskContext) -> Self {
        let capacity = (config.sample_rate as usize * config.channels.max(1) as usize * BUFFER_SECONDS)
            .max(config.samples_per_frame * 2);
        Self {
            shared: AudioShared {
                config,
                ctx,
                signal: Arc::new(CaptureSignal::new()),
                staging: Arc::new(Mutex::new(Staging::new(capacity))),
                counters: Arc::new(Mutex::new(AudioCounters::default())),
                state: Arc::new(Mutex::new(TaskState::Idle)),
            },
            encoder: Some(encoder),
            input,
            input_started: false,
            start_tx: None,
            handle: None,
        }
    }

    pub fn audio_counters(&self) -> AudioCounters {
        *self.shared.counters.lock()
    }

    fn input_callback(&self) -> AudioBufferCallback {
        let converter = PcmConverter::new(self.shared.config.sample_rate as f64, self.shared.config.channels);
        let staging = Arc::clone(&self.shared.staging);
        let signal = Arc::clone(&self.shared.signal);
        let channels_out = self.shared.config.channels.max(1) as usize;
        Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            let converted = converter.convert(samples, sample_rate, channels);
            {
                let mut staging = staging.lock();
                if signal.is_paused() {
                    staging.discard((converted.len() / channels_out) as u64);
                } else {
                    staging.push(&converted);
                }
            }
            signal.notify_available();
        })
    }
}

impl<E: AudioEncoder> EncodeTask for AudioTask<E> {
    fn track_type(&self) -> TrackType {
        TrackType::Audio
    }

    fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    fn prepare(&mut self) -> Result<(), CaptureError> {
        let Some(mut encoder) = self.encoder.take() else {
            return Err(CaptureError::Prepare("audio task already prepared".into()));
        };
        self.shared.set_state(TaskState::Preparing);

        let setup = if self.input.is_available() {
            encoder
                .configure(&self.shared.config.audio_format())
                .and_then(|_| encoder.start())
        } else {
            Err(CaptureError::DeviceNotAvailable)
        };
        if let Err(e) = setup {
            encoder.release();
            self.shared.set_state(TaskState::Stopped);
            return Err(prepare_error(TrackType::Audio, e));
        }

        let (start_tx, start_rx) = mpsc::channel();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("audio-encoder".into())
            .spawn(move || shared.run(encoder, start_rx))
            .map_err(|e| CaptureError::Prepare(format!("failed to spawn audio thread: {}", e)))?;
        self.handle = Some(handle);
        self.start_tx = Some(start_tx);

        let device = self.input.device_info();
        log::info!("audio task prepared with input {} ({})", device.name, device.id);
        self.shared.ctx.notify_prepared(TrackType::Audio);
        Ok(())
    }

    fn start_capturing(&mut self) -> Result<(), CaptureError> {
        let Some(start_tx) = &self.start_tx else {
            log::debug!("audio task not prepared, ignoring start");
            return Ok(());
        };
        self.shared.signal.start_capturing();
        start_tx
            .send(true)
            .map_err(|_| CaptureError::EncodingFailed("audio thread exited".into()))?;
        let callback = self.input_callback();
        self.input.start(callback)?;
        self.input_started = true;
        Ok(())
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
        if self.input_started {
            self.input_started = false;
            if let Err(e) = self.input.stop() {
                log::warn!("failed to stop audio input: {}", e);
            }
        }
        self.shared.signal.stop_capturing();
        if let Some(start_tx) = self.start_tx.take() {
            let _ = start_tx.send(false);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("audio thread panicked");
            }
        }
    }

    fn counters(&self) -> TaskCounters {
        TaskCounters::Audio(self.audio_counters())
    }
}

impl<E: AudioEncoder> Drop for AudioTask<E> {
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
    use crate::test_support::{FakeAudioInput, FakeEncoder, MemoryWriter};
    use std::time::Instant;

    fn task(config: RecordingConfig) -> (AudioTask<FakeEncoder>, FakeEncoder, FakeAudioInput, MemoryWriter) {
        let encoder = FakeEncoder::new();
        let input = FakeAudioInput::new();
        let writer = MemoryWriter::new();
        let muxer = Arc::new(Mutex::new(Multiplexer::new(Box::new(writer.clone()), 1, 64)));
        let ctx = TaskContext::new(
            muxer,
            Arc::new(Mutex::new(SessionState::Recording)),
            None,
            SessionClock::start(),
        );
        let task = AudioTask::new(encoder.clone(), Box::new(input.clone()), config, ctx);
        (task, encoder, input, writer)
    }

    fn small_chunks() -> RecordingConfig {
        RecordingConfig {
            sample_rate: 1000,
            samples_per_frame: 100,
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

    #[test]
    fn timeline_counts_frames() {
        let mut timeline = AudioTimeline {
            anchor_us: 500,
            frames: 0,
            sample_rate: 44100,
        };
        assert_eq!(timeline.pts_us(), 500);
        timeline.advance(1024);
        assert_eq!(timeline.pts_us(), 500 + 23_219);
    }

    #[test]
    fn encodes_full_chunks_with_sample_count_timestamps() {
        let (mut task, encoder, input, writer) = task(small_chunks());
        task.prepare().unwrap();
        task.start_capturing().unwrap();
        assert!(input.is_started());

        input.deliver(&[0.25; 250], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().chunks_encoded == 2));
        task.stop();

        let counters = task.audio_counters();
        assert_eq!(counters.chunks_encoded, 3);
        assert_eq!(counters.frames_encoded, 250);
        assert!(!input.is_started());
        assert!(encoder.probe().lock().released);

        let contents = writer.contents();
        let contents = contents.lock();
        let pts: Vec<i64> = contents.samples.iter().map(|(_, s)| s.presentation_time_us).collect();
        assert_eq!(pts, vec![0, 100_000, 200_000]);
        assert_eq!(contents.samples[0].1.payload.len(), 200);
        assert_eq!(contents.samples[2].1.payload.len(), 100);
        assert_eq!(contents.finished, 1);
    }

    #[test]
    fn input_is_converted_to_configured_layout() {
        let (mut task, _encoder, input, writer) = task(small_chunks());
        task.prepare().unwrap();
        task.start_capturing().unwrap();

        // 200 stereo frames at 2 kHz become 100 mono frames at 1 kHz.
        input.deliver(&[0.5; 400], 2000.0, 2);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().chunks_encoded == 1));
        task.stop();

        let contents = writer.contents();
        let contents = contents.lock();
        let decoded = pcm::from_int16_le(&contents.samples[0].1.payload);
        assert_eq!(decoded.len(), 100);
        assert!((decoded[10] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn paused_audio_is_discarded_but_timeline_advances() {
        let (mut task, _encoder, input, writer) = task(small_chunks());
        task.prepare().unwrap();
        task.start_capturing().unwrap();

        input.deliver(&[0.1; 100], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().chunks_encoded == 1));

        task.pause();
        assert_eq!(task.state(), TaskState::Paused);
        input.deliver(&[0.1; 200], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().frames_discarded == 200));

        task.resume();
        input.deliver(&[0.1; 100], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().chunks_encoded == 2));
        task.stop();

        let contents = writer.contents();
        let contents = contents.lock();
        let pts: Vec<i64> = contents.samples.iter().map(|(_, s)| s.presentation_time_us).collect();
        assert_eq!(pts, vec![0, 300_000]);
    }

    #[test]
    fn pause_applies_at_capture_time() {
        let (mut task, _encoder, input, writer) = task(small_chunks());
        task.prepare().unwrap();
        task.start_capturing().unwrap();

        // Less than a chunk is staged when the pause lands; it is still encoded.
        input.deliver(&[0.1; 50], 1000.0, 1);
        task.pause();
        input.deliver(&[0.1; 200], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().frames_discarded == 200));
        task.resume();
        input.deliver(&[0.1; 100], 1000.0, 1);
        assert!(wait_until(Duration::from_secs(2), || task.audio_counters().chunks_encoded == 2));
        task.stop();

        let counters = task.audio_counters();
        assert_eq!(counters.frames_encoded, 150);
        assert_eq!(counters.frames_discarded, 200);
        let contents = writer.contents();
        let contents = contents.lock();
        let pts: Vec<i64> = contents.samples.iter().map(|(_, s)| s.presentation_time_us).collect();
        assert_eq!(pts, vec![0, 250_000]);
    }

    #[test]
    fn staging_splits_chunks_at_gaps() {
        let mut staging = Staging::new(1000);
        staging.push(&[0.5; 30]);
        staging.discard(40);
        staging.discard(10);
        staging.push(&[0.5; 120]);

        assert_eq!(staging.next_piece(100), Some(Piece::Samples(vec![0.5; 30])));
        assert_eq!(staging.next_piece(100), Some(Piece::Gap(50)));
        assert_eq!(staging.next_piece(100), Some(Piece::Samples(vec![0.5; 100])));
        assert_eq!(staging.next_piece(100), None);
        assert_eq!(staging.samples.count(), 20);
    }

    #[test]
    fn unavailable_input_fails_prepare() {
        struct Missing;
        impl AudioInput for Missing {
            fn is_available(&self) -> bool {
                false
            }
            fn start(&mut self, _callback: AudioBufferCallback) -> Result<(), CaptureError> {
                Ok(())
            }
            fn stop(&mut self) -> Result<(), CaptureError> {
                Ok(())
            }
            fn device_info(&self) -> crate::traits::audio_input::AudioDeviceInfo {
                crate::traits::audio_input::AudioDeviceInfo {
                    id: String::new(),
                    name: String::new(),
                    is_default: false,
                }
            }
        }

        let encoder = FakeEncoder::new();
        let muxer = Arc::new(Mutex::new(Multiplexer::new(Box::new(MemoryWriter::new()), 1, 64)));
        let ctx = TaskContext::new(muxer, Arc::new(Mutex::new(SessionState::Preparing)), None, SessionClock::start());
        let mut task = AudioTask::new(encoder.clone(), Box::new(Missing), RecordingConfig::default(), ctx);
        assert_eq!(
            task.prepare(),
            Err(CaptureError::Prepare("audio task: device not available".into()))
        );
        assert!(encoder.probe().lock().released);
        assert!(!encoder.probe().lock().started);
    }
}
