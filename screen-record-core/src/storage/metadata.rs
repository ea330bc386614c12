use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingMetadata;

/// Path of the JSON sidecar for `recording_path`.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file.
///
/// Creates `{recording_stem}.metadata.json` alongside the recording.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(recording_path), json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    let metadata: RecordingMetadata = serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::{Codec, TrackType};
    use crate::models::recording_result::{TrackSummary, VideoCounters};

    #[test]
    fn sidecar_round_trip() {
        let recording = std::env::temp_dir().join(format!("recording_{}.srmx", uuid::Uuid::new_v4()));
        let metadata = RecordingMetadata {
            id: uuid::Uuid::new_v4(),
            duration_secs: 2.5,
            file_path: recording.to_string_lossy().into_owned(),
            checksum: "ab".repeat(32),
            created_at: chrono::Utc::now(),
            tracks: vec![TrackSummary {
                track_type: TrackType::Video,
                codec: Codec::H264,
                samples: 62,
                first_pts_us: Some(0),
                last_pts_us: Some(2_440_000),
            }],
            video: Some(VideoCounters {
                fresh_frames: 10,
                filler_frames: 52,
                frames_submitted: 62,
            }),
            audio: None,
            failure: None,
        };

        write_metadata(&metadata, &recording).unwrap();
        assert!(metadata_path(&recording).to_string_lossy().ends_with(".metadata.json"));
        assert_eq!(read_metadata(&recording).unwrap(), metadata);
        fs::remove_file(metadata_path(&recording)).ok();
    }

    #[test]
    fn missing_sidecar_is_storage_error() {
        let recording = std::env::temp_dir().join(format!("missing_{}.srmx", uuid::Uuid::new_v4()));
        assert!(matches!(read_metadata(&recording), Err(CaptureError::StorageError(_))));
    }
}
