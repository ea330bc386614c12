//! Synthetic virtual displays.
//!
//! - `ManualDisplay`: frames are pushed by the caller through a
//!   [`FrameInjector`], one per call. Used to script capture sessions.
//! - `TestPatternDisplay`: a producer thread renders a moving bar pattern at
//!   a fixed rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use screen_record_core::gpu::source::SourceSurface;
use screen_record_core::models::error::CaptureError;
use screen_record_core::models::media::VideoFrame;
use screen_record_core::traits::display::{DisplayParams, VirtualDisplay};

#[derive(Debug, Default)]
struct DisplaySlot {
    target: Option<SourceSurface>,
    params: Option<DisplayParams>,
}

/// Display whose frames are supplied by a [`FrameInjector`].
#[derive(Debug, Default)]
pub struct ManualDisplay {
    slot: Arc<Mutex<DisplaySlot>>,
}

/// Handle used to push frames into a [`ManualDisplay`] from any thread.
#[derive(Debug, Clone)]
pub struct FrameInjector {
    slot: Arc<Mutex<DisplaySlot>>,
}

impl ManualDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injector(&self) -> FrameInjector {
        FrameInjector {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl FrameInjector {
    /// Push a solid frame of the display's size.
    pub fn push(&self, rgba: u32, timestamp_ns: i64) -> Result<(), CaptureError> {
        let target = self.target()?;
        target.push_frame(VideoFrame::solid(target.width(), target.height(), rgba, timestamp_ns))
    }

    pub fn push_frame(&self, frame: VideoFrame) -> Result<(), CaptureError> {
        self.target()?.push_frame(frame)
    }

    /// Parameters the display was created with, once it is mirroring.
    pub fn params(&self) -> Option<DisplayParams> {
        self.slot.lock().params.clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().target.is_some()
    }

    fn target(&self) -> Result<SourceSurface, CaptureError> {
        self.slot.lock().target.clone().ok_or(CaptureError::DeviceNotAvailable)
    }
}

impl VirtualDisplay for ManualDisplay {
    fn create(&mut self, params: &DisplayParams, target: SourceSurface) -> Result<(), CaptureError> {
        let mut slot = self.slot.lock();
        if slot.target.is_some() {
            return Err(CaptureError::ConfigurationFailed("display already created".into()));
        }
        log::info!(
            "virtual display `{}` {}x{} @{}dpi created",
            params.name,
            params.width,
            params.height,
            params.density
        );
        slot.params = Some(params.clone());
        slot.target = Some(target);
        Ok(())
    }

    fn release(&mut self) {
        let mut slot = self.slot.lock();
        if slot.target.take().is_some() {
            log::info!("virtual display released");
        }
    }
}

/// Display producing a moving vertical bar at `frame_rate` frames per second.
pub struct TestPatternDisplay {
    frame_rate: u32,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestPatternDisplay {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate: frame_rate.max(1),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

/// Bar pattern for frame `index`: background with a 1/8-width bar that
/// sweeps left to right once per 64 frames.
pub fn pattern_frame(width: u32, height: u32, index: u64, timestamp_ns: i64) -> VideoFrame {
    const BACKGROUND: u32 = 0x202020ff;
    const BAR: u32 = 0xf0c040ff;
    let bar_width = (width / 8).max(1);
    let bar_x = ((index % 64) * u64::from(width) / 64) as u32;
    let mut pixels = vec![BACKGROUND; (width * height) as usize];
    for row in pixels.chunks_exact_mut(width as usize) {
        for x in bar_x..(bar_x + bar_width).min(width) {
            row[x as usize] = BAR;
        }
    }
    VideoFrame::new(width, height, pixels, timestamp_ns)
}

impl VirtualDisplay for TestPatternDisplay {
    fn create(&mut self, params: &DisplayParams, target: SourceSurface) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed("test pattern already running".into()));
        }
        let running = Arc::clone(&self.running);
        let interval = Duration::from_secs(1) / self.frame_rate;
        let (width, height) = (params.width, params.height);
        let handle = thread::Builder::new()
            .name("test-pattern".into())
            .spawn(move || {
                let origin = Instant::now();
                let mut index = 0u64;
                while running.load(Ordering::SeqCst) {
                    let ts = origin.elapsed().as_nanos() as i64;
                    if let Err(e) = target.push_frame(pattern_frame(width, height, index, ts)) {
                        log::debug!("test pattern stopped: {}", e);
                        break;
                    }
                    index += 1;
                    thread::sleep(interval);
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Prepare(format!("failed to spawn pattern thread: {}", e)))?;
        self.handle = Some(handle);
        Ok(())
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TestPatternDisplay {
    fn drop(&mut self) {
        self.release();
    }
}
