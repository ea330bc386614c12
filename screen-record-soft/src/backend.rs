use parking_lot::Mutex;

use screen_record_core::models::error::CaptureError;
use screen_record_core::traits::backend::MediaBackend;

use crate::audio_encoder::SoftAudioEncoder;
use crate::soft_gpu::SoftGpu;
use crate::video_encoder::SoftVideoEncoder;

/// [`MediaBackend`] built entirely from the software components.
///
/// Every session shares one [`SoftGpu`], so its resource counts cover all
/// sessions. The most recently created encoders are kept for inspection.
#[derive(Default)]
pub struct SoftBackend {
    gpu: SoftGpu,
    last_video: Mutex<Option<SoftVideoEncoder>>,
    last_audio: Mutex<Option<SoftAudioEncoder>>,
}

impl SoftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gpu(&self) -> &SoftGpu {
        &self.gpu
    }

    pub fn last_video_encoder(&self) -> Option<SoftVideoEncoder> {
        self.last_video.lock().clone()
    }

    pub fn last_audio_encoder(&self) -> Option<SoftAudioEncoder> {
        self.last_audio.lock().clone()
    }
}

impl MediaBackend for SoftBackend {
    type Graphics = SoftGpu;
    type Video = SoftVideoEncoder;
    type Audio = SoftAudioEncoder;

    fn graphics_device(&self) -> Result<SoftGpu, CaptureError> {
        Ok(self.gpu.clone())
    }

    fn video_encoder(&self) -> Result<SoftVideoEncoder, CaptureError> {
        let encoder = SoftVideoEncoder::new();
        *self.last_video.lock() = Some(encoder.clone());
        Ok(encoder)
    }

    fn audio_encoder(&self) -> Result<SoftAudioEncoder, CaptureError> {
        let encoder = SoftAudioEncoder::new();
        *self.last_audio.lock() = Some(encoder.clone());
        Ok(encoder)
    }
}
