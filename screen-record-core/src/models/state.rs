use super::error::CaptureError;

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → preparing → recording ↔ paused
///                        ↓         ↓
///                     stopping → stopped
///
/// any non-terminal state → failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Preparing,
    Recording,
    Paused,
    Stopping,
    Stopped,
    Failed(CaptureError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Recording or paused: capture threads are alive.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// Re-entering the current state is not a transition; callers treat it as a no-op.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Preparing) => true,
            (Preparing, Recording) | (Preparing, Stopping) => true,
            (Recording, Paused) | (Recording, Stopping) => true,
            (Paused, Recording) | (Paused, Stopping) => true,
            (Stopping, Stopped) => true,
            (Stopped, _) => false,
            (Failed(_), Stopping) | (Failed(_), Stopped) => true,
            (s, Failed(_)) => !s.is_terminal(),
            _ => false,
        }
    }
}

/// Lifecycle of a single capture/encode task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Preparing,
    Capturing,
    Paused,
    Stopping,
    Stopped,
}
