use std::sync::Arc;

use parking_lot::Mutex;

use super::context::GpuContext;
use super::matrix::TransformMatrix;
use crate::models::error::CaptureError;
use crate::models::media::VideoFrame;
use crate::processing::signal::CaptureSignal;
use crate::traits::graphics::{GraphicsDevice, TextureId};

#[derive(Debug, Default)]
struct FrameSlot {
    latest: Option<VideoFrame>,
    released: bool,
    frames_pushed: u64,
    frames_dropped: u64,
}

/// Producer side of the external source texture.
///
/// Handed to a [`VirtualDisplay`](crate::traits::display::VirtualDisplay),
/// which pushes frames from its own thread. Pushing only stores the frame and
/// raises the frame-available signal; no graphics state is touched.
#[derive(Debug, Clone)]
pub struct SourceSurface {
    slot: Arc<Mutex<FrameSlot>>,
    signal: Arc<CaptureSignal>,
    width: u32,
    height: u32,
}

impl SourceSurface {
    /// Replace the pending frame with `frame` and signal frame-available.
    ///
    /// A frame that was still pending is dropped; only the latest one is
    /// ever latched.
    pub fn push_frame(&self, frame: VideoFrame) -> Result<(), CaptureError> {
        {
            let mut slot = self.slot.lock();
            if slot.released {
                return Err(CaptureError::UseAfterRelease("source surface"));
            }
            if slot.latest.replace(frame).is_some() {
                slot.frames_dropped += 1;
            }
            slot.frames_pushed += 1;
        }
        self.signal.notify_available();
        Ok(())
    }

    /// Default buffer size the producer should render at.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_released(&self) -> bool {
        self.slot.lock().released
    }

    pub fn frames_pushed(&self) -> u64 {
        self.slot.lock().frames_pushed
    }
}

/// Consumer side: an external texture whose content is replaced in place
/// each time [`SourceTexture::update_tex_image`] latches a pending frame.
#[derive(Debug)]
pub struct SourceTexture {
    texture: TextureId,
    slot: Arc<Mutex<FrameSlot>>,
    transform: TransformMatrix,
    released: bool,
}

impl SourceTexture {
    /// Wrap `texture` and return it with the producer surface that feeds it.
    pub fn new(texture: TextureId, width: u32, height: u32, signal: Arc<CaptureSignal>) -> (Self, SourceSurface) {
        let slot = Arc::new(Mutex::new(FrameSlot::default()));
        let surface = SourceSurface {
            slot: Arc::clone(&slot),
            signal,
            width,
            height,
        };
        let texture = Self {
            texture,
            slot,
            transform: TransformMatrix::IDENTITY,
            released: false,
        };
        (texture, surface)
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().latest.is_some()
    }

    /// Latch the pending frame, if any, into the texture and refresh the
    /// transform. Returns whether a new frame was latched.
    pub fn update_tex_image<G: GraphicsDevice>(&mut self, ctx: &mut GpuContext<G>) -> Result<bool, CaptureError> {
        if self.released {
            return Err(CaptureError::UseAfterRelease("source texture"));
        }
        let Some(frame) = self.slot.lock().latest.take() else {
            return Ok(false);
        };
        self.transform = ctx.device_mut().latch_external_image(self.texture, &frame);
        ctx.check_error("update_tex_image")?;
        Ok(true)
    }

    /// Throw away the pending frame without touching the texture.
    pub fn discard_pending(&mut self) -> bool {
        self.slot.lock().latest.take().is_some()
    }

    /// Transform reported with the most recently latched frame.
    pub fn transform_matrix(&self) -> TransformMatrix {
        self.transform
    }

    /// Detach the producer surface. Later pushes fail with `UseAfterRelease`.
    pub fn release_surface(&self) {
        let mut slot = self.slot.lock();
        slot.released = true;
        slot.latest = None;
    }

    pub fn frames_dropped(&self) -> u64 {
        self.slot.lock().frames_dropped
    }

    /// Delete the texture and detach the producer. Safe to call twice.
    pub fn release<G: GraphicsDevice>(&mut self, ctx: &mut GpuContext<G>) {
        self.release_surface();
        if !self.released {
            self.released = true;
            ctx.device_mut().delete_texture(self.texture);
        }
    }
}
