use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::media::{Codec, MediaFormat};

/// Bits per pixel used to derive the default video bitrate.
const BITS_PER_PIXEL: f32 = 0.25;

/// What the video task emits while a session is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// Keep presenting the last drawn image at the frame cadence.
    #[default]
    HoldLastFrame,
    /// Present nothing until resumed.
    Freeze,
}

/// Configuration for a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Capture width in pixels (default: 1280).
    pub width: u32,

    /// Capture height in pixels (default: 720).
    pub height: u32,

    /// Virtual display density in dpi (default: 320).
    pub density: u32,

    /// Target frame rate (default: 25).
    pub frame_rate: u32,

    /// Video bitrate in bits/s. `None` derives it from the frame size.
    pub video_bitrate: Option<u32>,

    /// Seconds between key frames (default: 10).
    pub key_frame_interval_secs: u32,

    /// Record an audio track alongside the video (default: true).
    pub enable_audio: bool,

    /// Audio sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Audio channel count, 1 or 2 (default: 1).
    pub channels: u16,

    /// Audio bitrate in bits/s (default: 64000).
    pub audio_bitrate: u32,

    /// PCM frames handed to the audio encoder per input buffer (default: 1024).
    pub samples_per_frame: usize,

    pub pause_policy: PausePolicy,

    /// Pending samples a track may hold while waiting for the other track
    /// before the multiplexer flushes anyway (default: 512).
    pub max_buffered_samples: usize,

    /// Directory used when the output hint does not name a file.
    pub output_directory: PathBuf,
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be non-zero".into());
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(format!("dimensions must be even, got {}x{}", self.width, self.height));
        }
        if !(1..=60).contains(&self.frame_rate) {
            return Err(format!("frame rate must be between 1 and 60, got {}", self.frame_rate));
        }
        if self.video_bitrate == Some(0) || self.audio_bitrate == 0 {
            return Err("bitrates must be positive".into());
        }
        if self.enable_audio {
            if self.sample_rate == 0 {
                return Err("sample rate must be positive".into());
            }
            if ![1, 2].contains(&self.channels) {
                return Err(format!("unsupported channel count: {}", self.channels));
            }
            if self.samples_per_frame == 0 {
                return Err("samples per frame must be positive".into());
            }
        }
        if self.max_buffered_samples == 0 {
            return Err("max buffered samples must be positive".into());
        }
        Ok(())
    }

    /// Time between emitted frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.frame_rate.max(1)))
    }

    pub fn effective_video_bitrate(&self) -> u32 {
        self.video_bitrate.unwrap_or_else(|| {
            (BITS_PER_PIXEL * self.frame_rate as f32 * self.width as f32 * self.height as f32) as u32
        })
    }

    /// Format requested from the video encoder.
    pub fn video_format(&self) -> MediaFormat {
        MediaFormat::Video {
            codec: Codec::H264,
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            bitrate: self.effective_video_bitrate(),
            key_frame_interval_secs: self.key_frame_interval_secs,
            codec_config: Vec::new(),
        }
    }

    /// Format requested from the audio encoder.
    pub fn audio_format(&self) -> MediaFormat {
        MediaFormat::Audio {
            codec: Codec::Aac,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.audio_bitrate,
            codec_config: Vec::new(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read config: {}", e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), CaptureError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| CaptureError::StorageError(format!("failed to write config: {}", e)))
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            density: 320,
            frame_rate: 25,
            video_bitrate: None,
            key_frame_interval_secs: 10,
            enable_audio: true,
            sample_rate: 44100,
            channels: 1,
            audio_bitrate: 64000,
            samples_per_frame: 1024,
            pause_policy: PausePolicy::default(),
            max_buffered_samples: 512,
            output_directory: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RecordingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval(), Duration::from_millis(40));
        assert_eq!(config.effective_video_bitrate(), 5_760_000);
    }

    #[test]
    fn encoder_formats_follow_config() {
        let config = RecordingConfig {
            video_bitrate: Some(2_000_000),
            channels: 2,
            ..Default::default()
        };
        match config.video_format() {
            MediaFormat::Video { width, height, bitrate, key_frame_interval_secs, .. } => {
                assert_eq!((width, height), (1280, 720));
                assert_eq!(bitrate, 2_000_000);
                assert_eq!(key_frame_interval_secs, 10);
            }
            other => panic!("unexpected format {:?}", other),
        }
        assert_eq!(config.audio_format().codec(), Codec::Aac);
    }

    #[test]
    fn rejects_odd_dimensions() {
        let config = RecordingConfig {
            width: 1281,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("even"));
    }

    #[test]
    fn rejects_frame_rate_out_of_range() {
        for frame_rate in [0, 61] {
            let config = RecordingConfig {
                frame_rate,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn audio_checks_skipped_without_audio() {
        let config = RecordingConfig {
            enable_audio: false,
            channels: 6,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_round_trip_fills_missing_fields() {
        let path = std::env::temp_dir().join(format!("screen_record_config_{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{ "width": 640, "height": 480, "pause_policy": "freeze" }"#).unwrap();

        let config = RecordingConfig::from_json_file(&path).unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.pause_policy, PausePolicy::Freeze);

        config.to_json_file(&path).unwrap();
        assert_eq!(RecordingConfig::from_json_file(&path).unwrap(), config);
        fs::remove_file(&path).ok();
    }
}
