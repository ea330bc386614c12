use std::path::Path;

use crate::models::error::CaptureError;
use crate::storage::container_writer::InterleavedFileWriter;
use crate::traits::container::ContainerWriter;
use crate::traits::encoder::{AudioEncoder, VideoEncoder};
use crate::traits::graphics::GraphicsDevice;

/// Factory for the platform pieces of a recording session.
pub trait MediaBackend: Send + Sync {
    type Graphics: GraphicsDevice;
    type Video: VideoEncoder;
    type Audio: AudioEncoder;

    fn graphics_device(&self) -> Result<Self::Graphics, CaptureError>;

    fn video_encoder(&self) -> Result<Self::Video, CaptureError>;

    fn audio_encoder(&self) -> Result<Self::Audio, CaptureError>;

    fn container_writer(&self, path: &Path) -> Result<Box<dyn ContainerWriter>, CaptureError> {
        Ok(Box::new(InterleavedFileWriter::create(path.to_path_buf())?))
    }
}
