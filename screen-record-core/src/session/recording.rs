use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::muxer::Multiplexer;
use super::task::{EncodeTask, TaskContext, TaskCounters};
use crate::models::config::RecordingConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::SessionState;
use crate::processing::clock::SessionClock;
use crate::storage::metadata;
use crate::traits::container::ContainerWriter;
use crate::traits::recorder_delegate::RecorderDelegate;

/// Active-time bookkeeping: wall time since start minus time spent paused.
#[derive(Debug, Default)]
struct Timing {
    started: Option<Instant>,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

impl Timing {
    fn active_secs(&self) -> f64 {
        let Some(started) = self.started else {
            return 0.0;
        };
        let paused = self.paused_total + self.paused_since.map_or(Duration::ZERO, |since| since.elapsed());
        started.elapsed().saturating_sub(paused).as_secs_f64()
    }
}

/// One recording: a multiplexer, its encode tasks, and the session state
/// machine they share.
///
/// Control calls that are not valid in the current state are ignored, so
/// duplicate commands are harmless.
pub struct RecordingSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: RecordingConfig,
    output_path: PathBuf,
    state: Arc<Mutex<SessionState>>,
    muxer: Arc<Mutex<Multiplexer>>,
    clock: SessionClock,
    delegate: Option<Arc<dyn RecorderDelegate>>,
    tasks: Vec<Box<dyn EncodeTask>>,
    timing: Timing,
}

impl RecordingSession {
    /// `expected_tracks` is the number of tasks that will be added.
    pub fn new(
        config: RecordingConfig,
        output_path: PathBuf,
        writer: Box<dyn ContainerWriter>,
        expected_tracks: usize,
        delegate: Option<Arc<dyn RecorderDelegate>>,
    ) -> Self {
        let muxer = Multiplexer::new(writer, expected_tracks, config.max_buffered_samples);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            config,
            output_path,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            muxer: Arc::new(Mutex::new(muxer)),
            clock: SessionClock::start(),
            delegate,
            tasks: Vec::new(),
            timing: Timing::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Shared handle to the session state, readable while a control call runs.
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    pub fn is_paused(&self) -> bool {
        self.muxer.lock().is_paused()
    }

    /// Handles a task needs to feed this session.
    pub fn task_context(&self) -> TaskContext {
        TaskContext::new(
            Arc::clone(&self.muxer),
            Arc::clone(&self.state),
            self.delegate.clone(),
            self.clock,
        )
    }

    pub fn add_task(&mut self, task: Box<dyn EncodeTask>) {
        self.tasks.push(task);
    }

    pub fn counters(&self) -> Vec<TaskCounters> {
        self.tasks.iter().map(|task| task.counters()).collect()
    }

    fn set_state(&self, next: SessionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state == next || !state.can_transition_to(&next) {
                log::debug!("ignoring transition {:?} -> {:?}", *state, next);
                return false;
            }
            *state = next.clone();
        }
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&next);
        }
        true
    }

    fn fail(&self, error: &CaptureError) {
        self.set_state(SessionState::Failed(error.clone()));
        if let Some(delegate) = &self.delegate {
            delegate.on_error(error);
        }
    }

    /// Prepare every task. If one fails, the ones already prepared are
    /// stopped and the session ends up `Failed`.
    pub fn prepare(&mut self) -> Result<(), CaptureError> {
        if !self.set_state(SessionState::Preparing) {
            return Ok(());
        }
        log::info!("preparing session {} -> {}", self.id, self.output_path.display());
        for index in 0..self.tasks.len() {
            if let Err(e) = self.tasks[index].prepare() {
                log::error!("session {} prepare failed: {}", self.id, e);
                for task in &mut self.tasks[..index] {
                    task.stop();
                }
                self.fail(&e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        if !self.state.lock().can_transition_to(&SessionState::Recording) {
            log::debug!("session {} not prepared, ignoring start", self.id);
            return Ok(());
        }
        if let Err(e) = self.tasks.iter_mut().try_for_each(|task| task.start_capturing()) {
            log::error!("session {} start failed: {}", self.id, e);
            self.abort_start();
            self.fail(&e);
            return Err(e);
        }
        self.timing.started = Some(Instant::now());
        self.set_state(SessionState::Recording);
        log::info!("session {} recording", self.id);
        Ok(())
    }

    /// Tear down after a failed start: every task is stopped, including the
    /// ones already capturing, and whatever reached the muxer is finalized.
    fn abort_start(&mut self) {
        for task in &mut self.tasks {
            task.stop();
        }
        if let Err(e) = self.muxer.lock().finalize() {
            log::warn!("session {} could not finalize partial container: {}", self.id, e);
        }
    }

    pub fn pause(&mut self) -> Result<(), CaptureError> {
        if !self.state.lock().is_recording() {
            log::debug!("session {} not recording, ignoring pause", self.id);
            return Ok(());
        }
        for task in &mut self.tasks {
            task.pause();
        }
        self.muxer.lock().set_paused(true);
        self.timing.paused_since = Some(Instant::now());
        self.set_state(SessionState::Paused);
        log::info!("session {} paused", self.id);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CaptureError> {
        if !self.state.lock().is_paused() {
            log::debug!("session {} not paused, ignoring resume", self.id);
            return Ok(());
        }
        for task in &mut self.tasks {
            task.resume();
        }
        self.muxer.lock().set_paused(false);
        if let Some(since) = self.timing.paused_since.take() {
            self.timing.paused_total += since.elapsed();
        }
        self.set_state(SessionState::Recording);
        log::info!("session {} resumed", self.id);
        Ok(())
    }

    /// Stop every task, finalize the container and write the sidecar.
    ///
    /// Returns `None` when the session never started recording. A session
    /// that failed mid-recording is still finalized and keeps its `Failed`
    /// state; the failure is recorded in the metadata.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        let state = self.state();
        let failure = match &state {
            SessionState::Recording | SessionState::Paused => None,
            SessionState::Failed(e) if self.timing.started.is_some() => Some(e.to_string()),
            _ => {
                log::debug!("session {} in state {:?}, ignoring stop", self.id, state);
                return Ok(None);
            }
        };
        if failure.is_none() {
            self.set_state(SessionState::Stopping);
        }
        log::info!("stopping session {}", self.id);

        for task in &mut self.tasks {
            task.stop();
        }
        let duration_secs = {
            if let Some(since) = self.timing.paused_since.take() {
                self.timing.paused_total += since.elapsed();
            }
            self.timing.active_secs()
        };
        // Started tasks are past recovery once stopped; forget them.
        self.timing.started = None;

        let (summary, tracks) = {
            let mut muxer = self.muxer.lock();
            let summary = muxer.finalize();
            (summary, muxer.track_summaries())
        };
        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("session {} finalize failed: {}", self.id, e);
                self.fail(&e);
                return Err(e);
            }
        };

        let mut video = None;
        let mut audio = None;
        for counters in self.counters() {
            match counters {
                TaskCounters::Video(c) => video = Some(c),
                TaskCounters::Audio(c) => audio = Some(c),
            }
        }

        let metadata = RecordingMetadata {
            id: self.id,
            duration_secs,
            file_path: summary.path.to_string_lossy().into_owned(),
            checksum: summary.checksum.clone(),
            created_at: self.created_at,
            tracks,
            video,
            audio,
            failure: failure.or_else(|| match self.state() {
                SessionState::Failed(e) => Some(e.to_string()),
                _ => None,
            }),
        };
        if let Err(e) = metadata::write_metadata(&metadata, &summary.path) {
            log::warn!("failed to write metadata sidecar: {}", e);
        }

        let result = RecordingResult {
            file_path: summary.path.clone(),
            duration_secs,
            metadata,
            checksum: summary.checksum,
        };
        if result.metadata.failure.is_none() {
            self.set_state(SessionState::Stopped);
        }
        log::info!(
            "session {} finished: {} ({:.2}s)",
            self.id,
            result.file_path.display(),
            result.duration_secs
        );
        if let Some(delegate) = &self.delegate {
            delegate.on_recording_finished(&result);
        }
        Ok(Some(result))
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.state.lock().is_active() {
            log::warn!("session {} dropped while recording, stopping", self.id);
            if let Err(e) = self.stop() {
                log::error!("failed to stop session {} on drop: {}", self.id, e);
            }
        }
    }
}
