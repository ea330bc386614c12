use crate::models::error::CaptureError;
use crate::traits::encoder::EncoderInput;
use crate::traits::graphics::{ContextId, GraphicsDevice, SurfaceId};

use super::context::GpuContext;

/// What backs a [`RenderSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Pixel buffer with no consumer; presenting it has no visible effect.
    Offscreen,
    /// Window surface whose presented buffers go to a video encoder.
    EncoderInput,
}

/// A renderable target bound to one [`GpuContext`] at creation.
///
/// Dimensions are fixed. The surface is released exactly once; after that
/// every operation except `release` fails.
#[derive(Debug)]
pub struct RenderSurface {
    id: SurfaceId,
    context: ContextId,
    width: u32,
    height: u32,
    kind: SurfaceKind,
    released: bool,
}

impl RenderSurface {
    pub fn offscreen<G: GraphicsDevice>(
        ctx: &mut GpuContext<G>,
        width: u32,
        height: u32,
    ) -> Result<Self, CaptureError> {
        let context = ctx.id();
        let id = ctx.device_mut().create_offscreen_surface(context, width, height)?;
        ctx.surface_created();
        Ok(Self {
            id,
            context,
            width,
            height,
            kind: SurfaceKind::Offscreen,
            released: false,
        })
    }

    pub fn from_encoder_input<G: GraphicsDevice>(
        ctx: &mut GpuContext<G>,
        input: &EncoderInput,
    ) -> Result<Self, CaptureError> {
        let context = ctx.id();
        let id = ctx.device_mut().create_window_surface(context, input)?;
        ctx.surface_created();
        Ok(Self {
            id,
            context,
            width: input.width,
            height: input.height,
            kind: SurfaceKind::EncoderInput,
            released: false,
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn make_current<G: GraphicsDevice>(&self, ctx: &mut GpuContext<G>) -> Result<(), CaptureError> {
        self.ensure_live()?;
        ctx.make_current(self)
    }

    /// Timestamp for the next presented buffer.
    pub fn set_presentation_time<G: GraphicsDevice>(
        &self,
        ctx: &mut GpuContext<G>,
        nanos: i64,
    ) -> Result<(), CaptureError> {
        self.ensure_live()?;
        ctx.device_mut().set_presentation_time(self.id, nanos);
        Ok(())
    }

    /// Present the draw buffer. For an encoder surface this submits a frame.
    pub fn swap_buffers<G: GraphicsDevice>(&self, ctx: &mut GpuContext<G>) -> Result<(), CaptureError> {
        self.ensure_live()?;
        ctx.device_mut().swap_buffers(self.id)?;
        ctx.check_error("swap_buffers")
    }

    /// Destroy the surface. Calling it again has no effect.
    pub fn release<G: GraphicsDevice>(&mut self, ctx: &mut GpuContext<G>) {
        if self.released {
            return;
        }
        self.released = true;
        if ctx.current_surface() == Some(self.id) {
            if let Err(e) = ctx.make_nothing_current() {
                log::warn!("failed to unbind surface {:?} before release: {}", self.id, e);
            }
        }
        ctx.device_mut().destroy_surface(self.id);
        ctx.surface_released(self.id);
    }

    fn ensure_live(&self) -> Result<(), CaptureError> {
        if self.released {
            Err(CaptureError::UseAfterRelease("surface"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDevice, FrameCollector};

    #[test]
    fn encoder_surface_delivers_presented_frames() {
        let mut ctx = GpuContext::create(FakeDevice::new(), None).unwrap();
        let collector = FrameCollector::new();
        let input = collector.encoder_input(8, 4);

        let mut surface = RenderSurface::from_encoder_input(&mut ctx, &input).unwrap();
        assert_eq!(surface.kind(), SurfaceKind::EncoderInput);
        assert_eq!((surface.width(), surface.height()), (8, 4));

        surface.make_current(&mut ctx).unwrap();
        surface.set_presentation_time(&mut ctx, 40_000_000).unwrap();
        surface.swap_buffers(&mut ctx).unwrap();
        assert_eq!(collector.timestamps(), vec![40_000_000]);

        surface.release(&mut ctx);
        ctx.release();
    }

    #[test]
    fn offscreen_swap_succeeds() {
        let mut ctx = GpuContext::create(FakeDevice::new(), None).unwrap();
        let mut surface = RenderSurface::offscreen(&mut ctx, 1, 1).unwrap();
        surface.make_current(&mut ctx).unwrap();
        assert!(surface.swap_buffers(&mut ctx).is_ok());
        surface.release(&mut ctx);
        ctx.release();
    }

    #[test]
    fn operations_after_release_fail() {
        let mut ctx = GpuContext::create(FakeDevice::new(), None).unwrap();
        let mut surface = RenderSurface::offscreen(&mut ctx, 1, 1).unwrap();
        surface.release(&mut ctx);
        surface.release(&mut ctx);
        assert_eq!(ctx.live_surfaces(), 0);

        let expected = Err(CaptureError::UseAfterRelease("surface"));
        assert_eq!(surface.make_current(&mut ctx), expected);
        assert_eq!(surface.swap_buffers(&mut ctx), expected);
        assert_eq!(surface.set_presentation_time(&mut ctx, 0), expected);

        let device = ctx.release();
        assert_eq!(device.probe().lock().live_surfaces, 0);
    }
}
