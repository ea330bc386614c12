use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::audio_task::AudioTask;
use super::recording::RecordingSession;
use super::video_task::VideoTask;
use crate::models::config::RecordingConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;
use crate::traits::audio_input::AudioInput;
use crate::traits::backend::MediaBackend;
use crate::traits::display::VirtualDisplay;
use crate::traits::recorder_delegate::RecorderDelegate;

/// Extension of container files named by the controller.
pub const CONTAINER_EXTENSION: &str = "srmx";

/// Identifies the session started by [`RecordingController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub output_path: PathBuf,
}

/// Snapshot returned by [`RecordingController::query_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub is_paused: bool,
    pub state: SessionState,
}

/// Owns at most one recording session at a time and builds it from a
/// [`MediaBackend`].
///
/// A finished or failed session stays in place so its final state can be
/// queried; the next `start()` replaces it. Status queries read the
/// session's shared state and never wait for a control call in progress.
pub struct RecordingController<B: MediaBackend> {
    backend: B,
    config: RecordingConfig,
    delegate: Option<Arc<dyn RecorderDelegate>>,
    session: Mutex<Option<RecordingSession>>,
    state: Mutex<Arc<Mutex<SessionState>>>,
}

impl<B: MediaBackend> RecordingController<B> {
    pub fn new(backend: B, config: RecordingConfig) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            backend,
            config,
            delegate: None,
            session: Mutex::new(None),
            state: Mutex::new(Arc::new(Mutex::new(SessionState::Idle))),
        })
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn RecorderDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Prepare and start a new session.
    ///
    /// `output_hint` names the container file. An empty hint or an existing
    /// directory gets a generated `recording_<uuid>.srmx` name. Audio is
    /// recorded when an input is given and the configuration enables it.
    pub fn start(
        &self,
        video: Box<dyn VirtualDisplay>,
        audio: Option<Box<dyn AudioInput>>,
        output_hint: &Path,
    ) -> Result<SessionHandle, CaptureError> {
        let mut slot = self.session.lock();
        if let Some(session) = slot.as_ref() {
            if !session.state().is_terminal() {
                return Err(CaptureError::AlreadyRecording);
            }
        }

        let output_path = resolve_output_path(output_hint, &self.config.output_directory);
        let audio = audio.filter(|_| self.config.enable_audio);
        let expected_tracks = 1 + usize::from(audio.is_some());
        let writer = self.backend.container_writer(&output_path)?;

        let mut session = RecordingSession::new(
            self.config.clone(),
            output_path.clone(),
            writer,
            expected_tracks,
            self.delegate.clone(),
        );
        *self.state.lock() = session.state_handle();
        session.add_task(Box::new(VideoTask::new(
            self.backend.graphics_device()?,
            self.backend.video_encoder()?,
            video,
            self.config.clone(),
            session.task_context(),
        )));
        if let Some(input) = audio {
            session.add_task(Box::new(AudioTask::new(
                self.backend.audio_encoder()?,
                input,
                self.config.clone(),
                session.task_context(),
            )));
        }

        let handle = SessionHandle {
            id: session.id(),
            output_path,
        };
        let outcome = session.prepare().and_then(|_| session.start_recording());
        *slot = Some(session);
        outcome?;
        log::info!("started recording {} -> {}", handle.id, handle.output_path.display());
        Ok(handle)
    }

    /// Stop the active session. `Ok(None)` if nothing was recording.
    pub fn stop(&self) -> Result<Option<RecordingResult>, CaptureError> {
        match self.session.lock().as_mut() {
            Some(session) => session.stop(),
            None => {
                log::debug!("no session to stop");
                Ok(None)
            }
        }
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        match self.session.lock().as_mut() {
            Some(session) => session.pause(),
            None => Ok(()),
        }
    }

    pub fn resume(&self) -> Result<(), CaptureError> {
        match self.session.lock().as_mut() {
            Some(session) => session.resume(),
            None => Ok(()),
        }
    }

    pub fn query_status(&self) -> RecordingStatus {
        let state = self.state.lock().lock().clone();
        RecordingStatus {
            is_recording: state.is_active(),
            is_paused: state.is_paused(),
            state,
        }
    }
}

fn resolve_output_path(hint: &Path, output_directory: &Path) -> PathBuf {
    let file_name = || format!("recording_{}.{}", Uuid::new_v4(), CONTAINER_EXTENSION);
    if hint.as_os_str().is_empty() {
        output_directory.join(file_name())
    } else if hint.is_dir() {
        hint.join(file_name())
    } else {
        hint.to_path_buf()
    }
}
