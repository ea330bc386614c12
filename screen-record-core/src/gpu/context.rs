use crate::models::error::CaptureError;
use crate::traits::graphics::{ContextId, GraphicsDevice, SurfaceId, NO_ERROR};

use super::surface::RenderSurface;

/// Owns a rendering context on a [`GraphicsDevice`] and tracks which of its
/// surfaces is current.
///
/// A context lives on the thread that created it. Every surface, texture and
/// program made through it must be released before [`GpuContext::release`].
#[derive(Debug)]
pub struct GpuContext<G: GraphicsDevice> {
    device: G,
    id: ContextId,
    live_surfaces: usize,
    current: Option<SurfaceId>,
}

impl<G: GraphicsDevice> GpuContext<G> {
    /// Create a context on `device`, optionally sharing objects with `shared`.
    pub fn create(mut device: G, shared: Option<ContextId>) -> Result<Self, CaptureError> {
        let id = device.create_context(shared)?;
        log::debug!("created rendering context {:?}", id);
        Ok(Self {
            device,
            id,
            live_surfaces: 0,
            current: None,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn device_mut(&mut self) -> &mut G {
        &mut self.device
    }

    /// Bind `surface` as the draw target of this context on the calling thread.
    pub fn make_current(&mut self, surface: &RenderSurface) -> Result<(), CaptureError> {
        if surface.is_released() {
            return Err(CaptureError::Bind("surface"));
        }
        if surface.context() != self.id {
            return Err(CaptureError::Bind("surface of another context"));
        }
        if self.current == Some(surface.id()) {
            return Ok(());
        }
        self.device.make_current(self.id, Some(surface.id()))?;
        self.current = Some(surface.id());
        Ok(())
    }

    /// Bind the context without a draw surface.
    pub fn make_nothing_current(&mut self) -> Result<(), CaptureError> {
        self.device.make_current(self.id, None)?;
        self.current = None;
        Ok(())
    }

    pub fn current_surface(&self) -> Option<SurfaceId> {
        self.current
    }

    pub fn live_surfaces(&self) -> usize {
        self.live_surfaces
    }

    /// Read the device error flag after `op`; non-zero becomes `GraphicsOperation`.
    pub fn check_error(&mut self, op: &str) -> Result<(), CaptureError> {
        match self.device.get_error() {
            NO_ERROR => Ok(()),
            code => {
                log::error!("{}: graphics error 0x{:x}", op, code);
                Err(CaptureError::GraphicsOperation { op: op.to_string(), code })
            }
        }
    }

    /// Clear the current surface and flush queued commands.
    pub fn clear_and_flush(&mut self) -> Result<(), CaptureError> {
        self.device.clear([0.0, 0.0, 0.0, 1.0]);
        self.device.flush();
        self.check_error("clear")
    }

    pub(super) fn surface_created(&mut self) {
        self.live_surfaces += 1;
    }

    pub(super) fn surface_released(&mut self, surface: SurfaceId) {
        self.live_surfaces -= 1;
        if self.current == Some(surface) {
            self.current = None;
        }
    }

    /// Destroy the context and hand the device back.
    ///
    /// # Panics
    ///
    /// If a surface created on this context is still alive.
    pub fn release(mut self) -> G {
        assert_eq!(
            self.live_surfaces, 0,
            "rendering context released with {} live surfaces",
            self.live_surfaces
        );
        if self.current.is_some() {
            if let Err(e) = self.make_nothing_current() {
                log::warn!("failed to unbind context before release: {}", e);
            }
        }
        self.device.destroy_context(self.id);
        log::debug!("released rendering context {:?}", self.id);
        self.device
    }
}
