use crate::models::error::CaptureError;
use crate::models::media::TrackType;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Event delegate for recording session notifications.
///
/// Methods are called from the control thread or from task threads.
/// Implementations should marshal to a UI thread if needed.
pub trait RecorderDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called once a capture/encode task finished preparing.
    fn on_task_prepared(&self, track: TrackType);

    /// Called once a capture/encode task has torn down.
    fn on_task_stopped(&self, track: TrackType);

    /// Called when an error ends a task or the session.
    fn on_error(&self, error: &CaptureError);

    /// Called when the container is finalized.
    fn on_recording_finished(&self, result: &RecordingResult);
}
