use thiserror::Error;

/// Errors that can occur while preparing, running or finalizing a recording.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A task could not be prepared; the session never starts.
    #[error("prepare failed: {0}")]
    Prepare(String),

    #[error("no compatible rendering context configuration: {0}")]
    ContextCreation(String),

    #[error("cannot bind released {0}")]
    Bind(&'static str),

    /// GPU/driver failure mid-session. Fatal for the task that hit it.
    #[error("graphics operation `{op}` failed: error 0x{code:x}")]
    GraphicsOperation { op: String, code: u32 },

    #[error("{0} used after release")]
    UseAfterRelease(&'static str),

    #[error("container already finalized")]
    AlreadyFinalized,

    #[error("not all tracks ready: {registered} of {expected} registered")]
    NotAllTracksReady { registered: usize, expected: usize },

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown track {0}")]
    UnknownTrack(usize),

    #[error("timestamp went backwards on track {track}: {pts_us} < {last_us}")]
    NonMonotonicTimestamp { track: usize, pts_us: i64, last_us: i64 },

    #[error("timeout")]
    Timeout,
}

impl CaptureError {
    /// Errors that end the task which observed them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Prepare(_)
                | Self::GraphicsOperation { .. }
                | Self::UseAfterRelease(_)
                | Self::AlreadyFinalized
                | Self::EncodingFailed(_)
                | Self::StorageError(_)
        )
    }
}
