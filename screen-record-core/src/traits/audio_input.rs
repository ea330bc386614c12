use std::sync::Arc;

use crate::models::error::CaptureError;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples in `[-1.0, 1.0]`.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// Description of the device behind an audio input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// A microphone or system-audio source.
pub trait AudioInput: Send + 'static {
    /// Whether this capture source is currently available.
    fn is_available(&self) -> bool;

    /// Start capturing, delivering buffers via `callback`.
    ///
    /// The callback fires on a provider-owned thread; keep processing minimal.
    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError>;

    /// Stop capturing and release resources.
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn device_info(&self) -> AudioDeviceInfo;
}
