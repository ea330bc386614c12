use crate::gpu::source::SourceSurface;
use crate::models::error::CaptureError;

/// Parameters of a mirrored virtual display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayParams {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density: u32,
}

/// A system-provided mirror of the screen's pixel output.
pub trait VirtualDisplay: Send + 'static {
    /// Start mirroring into `target`. Frames are delivered on a
    /// display-owned thread through [`SourceSurface::push_frame`].
    fn create(&mut self, params: &DisplayParams, target: SourceSurface) -> Result<(), CaptureError>;

    /// Stop mirroring and drop the target surface.
    fn release(&mut self);
}
