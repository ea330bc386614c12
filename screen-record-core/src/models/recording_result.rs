use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::{Codec, TrackType};

/// Result returned when a recording session is stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Per-track summary written into the metadata sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    #[serde(rename = "type")]
    pub track_type: TrackType,
    pub codec: Codec,
    pub samples: u64,
    pub first_pts_us: Option<i64>,
    pub last_pts_us: Option<i64>,
}

/// Frame counters of the video task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCounters {
    /// Iterations that latched a new source frame and drew it.
    pub fresh_frames: u64,
    /// Iterations that presented without a new source frame.
    pub filler_frames: u64,
    /// Frames handed to the encoder.
    pub frames_submitted: u64,
}

/// Counters of the audio task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCounters {
    pub chunks_encoded: u64,
    pub frames_encoded: u64,
    pub frames_discarded: u64,
}

/// Metadata stored as a JSON sidecar next to the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: Uuid,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub tracks: Vec<TrackSummary>,
    pub video: Option<VideoCounters>,
    pub audio: Option<AudioCounters>,
    /// Error that ended the session early, if any.
    pub failure: Option<String>,
}
