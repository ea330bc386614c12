use std::path::PathBuf;

use crate::models::error::CaptureError;
use crate::models::media::{EncodedSample, MediaFormat};

/// Outcome of finalizing a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxSummary {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Samples written per track, indexed by track id.
    pub samples_per_track: Vec<u64>,
    /// SHA-256 hex digest of the finished file.
    pub checksum: String,
}

/// Sink for interleaved encoded samples.
pub trait ContainerWriter: Send {
    /// Declare a track. Only valid before `start`.
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize, CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Write one sample whose timestamp is already normalized.
    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<(), CaptureError>;

    /// Close the container. Called exactly once.
    fn finish(&mut self) -> Result<MuxSummary, CaptureError>;
}
