//! Sine tone audio input.
//!
//! Delivers interleaved f32 buffers of a fixed-frequency tone on a dedicated
//! thread, paced by wall time like a capture endpoint would be.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use screen_record_core::models::error::CaptureError;
use screen_record_core::traits::audio_input::{AudioBufferCallback, AudioDeviceInfo, AudioInput};

/// Buffer length delivered per callback.
const BUFFER_DURATION: Duration = Duration::from_millis(10);

/// Tone generator posing as a microphone.
pub struct ToneInput {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    running: Arc<AtomicBool>,
    capture_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ToneInput {
    pub fn new(frequency: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            frequency,
            amplitude: 0.25,
            sample_rate,
            channels: channels.max(1),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: Mutex::new(None),
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }
}

/// Generates consecutive tone buffers, keeping phase across calls.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    phase: f64,
    step: f64,
    amplitude: f32,
    channels: u16,
}

impl ToneGenerator {
    pub fn new(frequency: f64, sample_rate: u32, channels: u16, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / f64::from(sample_rate.max(1)),
            amplitude,
            channels: channels.max(1),
        }
    }

    /// Next `frames` frames, interleaved.
    pub fn next_buffer(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * self.channels as usize);
        for _ in 0..frames {
            let value = self.phase.sin() as f32 * self.amplitude;
            out.extend(std::iter::repeat(value).take(self.channels as usize));
            self.phase = (self.phase + self.step) % TAU;
        }
        out
    }
}

impl AudioInput for ToneInput {
    fn is_available(&self) -> bool {
        self.sample_rate > 0
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed("tone input already running".into()));
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let mut generator = ToneGenerator::new(self.frequency, self.sample_rate, self.channels, self.amplitude);
        let (sample_rate, channels) = (self.sample_rate, self.channels);
        let handle = thread::Builder::new()
            .name("tone-capture".into())
            .spawn(move || {
                let origin = Instant::now();
                let mut frames_delivered = 0u64;
                while running.load(Ordering::SeqCst) {
                    let due = (origin.elapsed().as_secs_f64() * f64::from(sample_rate)) as u64;
                    if due > frames_delivered {
                        let frames = (due - frames_delivered) as usize;
                        callback(&generator.next_buffer(frames), f64::from(sample_rate), channels);
                        frames_delivered = due;
                    }
                    thread::sleep(BUFFER_DURATION);
                }
                log::debug!("tone input delivered {} frames", frames_delivered);
            })
            .map_err(|e| CaptureError::Prepare(format!("failed to spawn tone thread: {}", e)))?;

        *self.capture_handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn device_info(&self) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: "tone".into(),
            name: format!("{} Hz tone", self.frequency),
            is_default: false,
        }
    }
}

impl Drop for ToneInput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
