use crate::gpu::matrix::TransformMatrix;
use crate::models::error::CaptureError;
use crate::models::media::VideoFrame;
use crate::traits::encoder::EncoderInput;

/// `get_error` value meaning no error is pending.
pub const NO_ERROR: u32 = 0;
pub const INVALID_ENUM: u32 = 0x0500;
pub const INVALID_VALUE: u32 = 0x0501;
pub const INVALID_OPERATION: u32 = 0x0502;
pub const OUT_OF_MEMORY: u32 = 0x0505;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Texture binding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
    /// Content supplied by an external producer (display mirror, camera).
    External,
}

/// Blit program variants, selected by the source texture target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Texture2D,
    TextureExternal,
}

impl ProgramKind {
    pub fn texture_target(self) -> TextureTarget {
        match self {
            Self::Texture2D => TextureTarget::Texture2D,
            Self::TextureExternal => TextureTarget::External,
        }
    }
}

/// A rendering device with EGL-style context/surface management and a
/// GLES-style drawing API.
///
/// Every method is called from the single thread that owns the device.
/// Drawing calls report failures through [`GraphicsDevice::get_error`],
/// which callers check after each operation.
pub trait GraphicsDevice: Send + 'static {
    /// Create a rendering context, optionally sharing objects with `shared`.
    fn create_context(&mut self, shared: Option<ContextId>) -> Result<ContextId, CaptureError>;

    fn destroy_context(&mut self, context: ContextId);

    fn create_offscreen_surface(
        &mut self,
        context: ContextId,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId, CaptureError>;

    /// Create a surface whose presented buffers feed an encoder input.
    fn create_window_surface(
        &mut self,
        context: ContextId,
        input: &EncoderInput,
    ) -> Result<SurfaceId, CaptureError>;

    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Bind `context` and `surface` (or no surface) to the calling thread.
    fn make_current(&mut self, context: ContextId, surface: Option<SurfaceId>) -> Result<(), CaptureError>;

    /// Timestamp attached to the next buffer presented from `surface`.
    fn set_presentation_time(&mut self, surface: SurfaceId, nanos: i64);

    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CaptureError>;

    fn create_texture(&mut self, target: TextureTarget) -> TextureId;

    fn delete_texture(&mut self, texture: TextureId);

    /// Latch `frame` as the content of an external texture and return the
    /// texture-coordinate transform the producer requires.
    fn latch_external_image(&mut self, texture: TextureId, frame: &VideoFrame) -> TransformMatrix;

    /// Create a blit program. Shader compilation belongs to the device.
    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramId, CaptureError>;

    fn delete_program(&mut self, program: ProgramId);

    /// Draw a full-viewport quad sampling `texture` into the current surface.
    fn draw_quad(
        &mut self,
        program: ProgramId,
        texture: TextureId,
        mvp: &TransformMatrix,
        tex_matrix: &TransformMatrix,
    );

    fn clear(&mut self, rgba: [f32; 4]);

    fn flush(&mut self);

    /// Return and reset the pending error flag, [`NO_ERROR`] when none.
    fn get_error(&mut self) -> u32;
}
