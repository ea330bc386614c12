use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of elementary stream carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Compressed stream codecs known to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    H264,
    Aac,
    /// Run-length coded RGBA, produced by the software encoder.
    RleRgba,
    /// Little-endian signed 16-bit PCM.
    Pcm16,
}

impl Codec {
    pub fn wire_id(self) -> u8 {
        match self {
            Self::H264 => 1,
            Self::Aac => 2,
            Self::RleRgba => 3,
            Self::Pcm16 => 4,
        }
    }

    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::H264),
            2 => Some(Self::Aac),
            3 => Some(Self::RleRgba),
            4 => Some(Self::Pcm16),
            _ => None,
        }
    }
}

/// Format of one encoded track, as reported by its encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaFormat {
    Video {
        codec: Codec,
        width: u32,
        height: u32,
        frame_rate: u32,
        bitrate: u32,
        key_frame_interval_secs: u32,
        /// Codec-specific data (parameter sets), possibly empty.
        #[serde(default)]
        codec_config: Vec<u8>,
    },
    Audio {
        codec: Codec,
        sample_rate: u32,
        channels: u16,
        bitrate: u32,
        #[serde(default)]
        codec_config: Vec<u8>,
    },
}

impl MediaFormat {
    pub fn track_type(&self) -> TrackType {
        match self {
            Self::Video { .. } => TrackType::Video,
            Self::Audio { .. } => TrackType::Audio,
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            Self::Video { codec, .. } | Self::Audio { codec, .. } => *codec,
        }
    }
}

/// One compressed access unit produced by an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSample {
    pub track_type: TrackType,
    pub presentation_time_us: i64,
    pub payload: Vec<u8>,
    pub is_key_frame: bool,
    pub is_end_of_stream: bool,
}

impl EncodedSample {
    pub fn new(track_type: TrackType, presentation_time_us: i64, payload: Vec<u8>) -> Self {
        Self {
            track_type,
            presentation_time_us,
            payload,
            is_key_frame: false,
            is_end_of_stream: false,
        }
    }

    pub fn key_frame(mut self) -> Self {
        self.is_key_frame = true;
        self
    }

    pub fn end_of_stream(track_type: TrackType, presentation_time_us: i64) -> Self {
        Self {
            track_type,
            presentation_time_us,
            payload: Vec::new(),
            is_key_frame: false,
            is_end_of_stream: true,
        }
    }
}

/// Track registered with the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: usize,
    pub format: MediaFormat,
}

/// An uncompressed RGBA image, either captured from a display or read back
/// from a rendered surface. Pixels are packed `0xRRGGBBAA`, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u32]>,
    pub timestamp_ns: i64,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>, timestamp_ns: i64) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels: pixels.into(),
            timestamp_ns,
        }
    }

    pub fn solid(width: u32, height: u32, rgba: u32, timestamp_ns: i64) -> Self {
        Self::new(width, height, vec![rgba; (width * height) as usize], timestamp_ns)
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }
}
