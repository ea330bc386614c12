//! Software audio encoder passing PCM16 through as the compressed stream.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use screen_record_core::models::error::CaptureError;
use screen_record_core::models::media::{Codec, EncodedSample, MediaFormat, TrackType};
use screen_record_core::traits::encoder::{AudioEncoder, Encoder, EncoderOutput};

use crate::output_queue::OutputQueue;

#[derive(Debug, Default)]
struct AudioState {
    running: bool,
    /// Bytes per interleaved frame.
    frame_bytes: usize,
    buffers_received: u64,
    bytes_in: u64,
}

/// Software [`AudioEncoder`]. Clones share the same encoder.
#[derive(Debug, Clone, Default)]
pub struct SoftAudioEncoder {
    state: Arc<Mutex<AudioState>>,
    output: Arc<OutputQueue>,
    format: Option<MediaFormat>,
}

impl SoftAudioEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers_received(&self) -> u64 {
        self.state.lock().buffers_received
    }

    pub fn bytes_in(&self) -> u64 {
        self.state.lock().bytes_in
    }
}

impl Encoder for SoftAudioEncoder {
    fn configure(&mut self, format: &MediaFormat) -> Result<(), CaptureError> {
        let MediaFormat::Audio {
            sample_rate, channels, ..
        } = *format
        else {
            return Err(CaptureError::ConfigurationFailed("audio encoder needs an audio format".into()));
        };
        if sample_rate == 0 || channels == 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid audio format {} Hz x{}",
                sample_rate, channels
            )));
        }
        // PCM16 is uncompressed; report its actual bitrate.
        self.format = Some(MediaFormat::Audio {
            codec: Codec::Pcm16,
            sample_rate,
            channels,
            bitrate: sample_rate * u32::from(channels) * 16,
            codec_config: Vec::new(),
        });
        *self.state.lock() = AudioState {
            frame_bytes: 2 * channels as usize,
            ..Default::default()
        };
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let format = self
            .format
            .clone()
            .ok_or_else(|| CaptureError::EncodingFailed("encoder not configured".into()))?;
        self.output.reset(format);
        self.state.lock().running = true;
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput, CaptureError> {
        Ok(self.output.dequeue(timeout))
    }

    fn stop(&mut self) {
        self.state.lock().running = false;
    }

    fn release(&mut self) {
        self.stop();
        self.output.clear();
    }
}

impl AudioEncoder for SoftAudioEncoder {
    fn queue_input(&mut self, pcm: &[u8], presentation_time_us: i64, end_of_stream: bool) -> Result<(), CaptureError> {
        {
            let mut state = self.state.lock();
            if !state.running {
                return Err(CaptureError::EncodingFailed("audio encoder not running".into()));
            }
            if self.output.is_input_ended() {
                return Err(CaptureError::EncodingFailed("input after end of stream".into()));
            }
            if pcm.len() % state.frame_bytes != 0 {
                return Err(CaptureError::EncodingFailed(format!(
                    "buffer of {} bytes is not a whole number of frames",
                    pcm.len()
                )));
            }
            state.buffers_received += 1;
            state.bytes_in += pcm.len() as u64;
        }
        if !pcm.is_empty() {
            let sample = EncodedSample::new(TrackType::Audio, presentation_time_us, pcm.to_vec()).key_frame();
            self.output.push(sample);
        }
        if end_of_stream {
            self.output.end_input();
        }
        Ok(())
    }
}
