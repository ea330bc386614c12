use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::muxer::Multiplexer;
use crate::models::error::CaptureError;
use crate::models::media::{EncodedSample, MediaFormat, TrackType};
use crate::models::recording_result::{AudioCounters, VideoCounters};
use crate::models::state::{SessionState, TaskState};
use crate::processing::clock::{MonotonicPts, SessionClock};
use crate::traits::encoder::{Encoder, EncoderOutput};
use crate::traits::recorder_delegate::RecorderDelegate;

/// Wait per encoder poll while draining towards end of stream.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
/// Longest wait for an encoder's end of stream once its input has ended.
pub const END_OF_STREAM_DEADLINE: Duration = Duration::from_secs(2);
/// Longest wait for a task thread to report the outcome of its setup.
pub const PREPARE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters reported by a task, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCounters {
    Video(VideoCounters),
    Audio(AudioCounters),
}

/// One capture → encode pipeline feeding a single multiplexer track.
///
/// Lifecycle: `prepare` → `start_capturing` → (`pause` ↔ `resume`) → `stop`.
/// `stop` is valid in every state and blocks until the task has released
/// all of its resources.
pub trait EncodeTask: Send {
    fn track_type(&self) -> TrackType;

    fn state(&self) -> TaskState;

    /// Create the encoder and capture resources. On error nothing is left
    /// allocated and no further calls are made except `stop`.
    fn prepare(&mut self) -> Result<(), CaptureError>;

    fn start_capturing(&mut self) -> Result<(), CaptureError>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn stop(&mut self);

    fn counters(&self) -> TaskCounters;
}

/// Session-wide handles every task shares.
#[derive(Clone)]
pub struct TaskContext {
    muxer: Arc<Mutex<Multiplexer>>,
    state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn RecorderDelegate>>,
    clock: SessionClock,
}

impl TaskContext {
    pub fn new(
        muxer: Arc<Mutex<Multiplexer>>,
        state: Arc<Mutex<SessionState>>,
        delegate: Option<Arc<dyn RecorderDelegate>>,
        clock: SessionClock,
    ) -> Self {
        Self {
            muxer,
            state,
            delegate,
            clock,
        }
    }

    pub fn muxer(&self) -> &Arc<Mutex<Multiplexer>> {
        &self.muxer
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    /// Record a task failure on the session and tell the delegate.
    pub fn fail(&self, error: CaptureError) {
        let failed = SessionState::Failed(error.clone());
        let changed = {
            let mut state = self.state.lock();
            if state.can_transition_to(&failed) {
                *state = failed.clone();
                true
            } else {
                false
            }
        };
        if let Some(delegate) = &self.delegate {
            if changed {
                delegate.on_state_changed(&failed);
            }
            delegate.on_error(&error);
        }
    }

    pub fn notify_prepared(&self, track: TrackType) {
        if let Some(delegate) = &self.delegate {
            delegate.on_task_prepared(track);
        }
    }

    pub fn notify_stopped(&self, track: TrackType) {
        if let Some(delegate) = &self.delegate {
            delegate.on_task_stopped(track);
        }
    }
}

/// Setup failures reach the session as `Prepare`.
pub(crate) fn prepare_error(track: TrackType, error: CaptureError) -> CaptureError {
    match error {
        CaptureError::Prepare(_) => error,
        other => CaptureError::Prepare(format!("{} task: {}", track, other)),
    }
}

/// Moves encoder output into the multiplexer for one track.
///
/// Registers the track when the encoder reports its format, then tries to
/// start the muxer; `NotAllTracksReady` only means another track is still
/// missing. Timestamps are clamped so the track never goes backwards.
pub(crate) struct TrackOutput {
    track_type: TrackType,
    track: Option<usize>,
    pts: MonotonicPts,
    ctx: TaskContext,
    samples: u64,
    finished: bool,
}

impl TrackOutput {
    pub fn new(track_type: TrackType, ctx: TaskContext) -> Self {
        Self {
            track_type,
            track: None,
            pts: MonotonicPts::new(),
            ctx,
            samples: 0,
            finished: false,
        }
    }

    /// Move every ready output to the muxer. Returns true at end of stream.
    pub fn drain<E: Encoder>(&mut self, encoder: &mut E, timeout: Duration) -> Result<bool, CaptureError> {
        loop {
            match encoder.dequeue_output(timeout)? {
                EncoderOutput::TryAgainLater => return Ok(false),
                EncoderOutput::EndOfStream => return Ok(true),
                EncoderOutput::FormatChanged(format) => self.register(format)?,
                EncoderOutput::Sample(mut sample) => {
                    let end = sample.is_end_of_stream;
                    if !sample.payload.is_empty() {
                        sample.is_end_of_stream = false;
                        self.write(sample)?;
                    }
                    if end {
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// Drain until end of stream or until `deadline` passes.
    pub fn drain_to_end<E: Encoder>(&mut self, encoder: &mut E, deadline: Duration) -> Result<(), CaptureError> {
        let until = Instant::now() + deadline;
        loop {
            if self.drain(encoder, DRAIN_TIMEOUT)? {
                return Ok(());
            }
            if Instant::now() >= until {
                log::warn!("{} encoder did not reach end of stream within {:?}", self.track_type, deadline);
                return Ok(());
            }
            thread::yield_now();
        }
    }

    fn register(&mut self, format: MediaFormat) -> Result<(), CaptureError> {
        if self.track.is_some() {
            log::warn!("{} encoder changed format mid-stream, keeping the first", self.track_type);
            return Ok(());
        }
        let mut muxer = self.ctx.muxer.lock();
        self.track = Some(muxer.register_track(format)?);
        match muxer.start() {
            Ok(()) | Err(CaptureError::NotAllTracksReady { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, mut sample: EncodedSample) -> Result<(), CaptureError> {
        let track = self
            .track
            .ok_or_else(|| CaptureError::EncodingFailed(format!("{} sample before output format", self.track_type)))?;
        sample.track_type = self.track_type;
        sample.presentation_time_us = self.pts.next(sample.presentation_time_us);
        self.ctx.muxer.lock().write_sample(track, sample)?;
        self.samples += 1;
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    /// Report the track as complete. Runs once.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let result = {
            let mut muxer = self.ctx.muxer.lock();
            match self.track {
                Some(track) => muxer.track_finished(track),
                None => muxer.abandon_track(),
            }
        };
        match result {
            Ok(Some(summary)) => log::info!("container finalized by {} track: {}", self.track_type, summary.path.display()),
            Ok(None) => {}
            Err(e) => {
                log::error!("failed to finish {} track: {}", self.track_type, e);
                self.ctx.fail(e);
            }
        }
    }
}
