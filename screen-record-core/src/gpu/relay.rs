use crate::models::error::CaptureError;
use crate::traits::graphics::{GraphicsDevice, ProgramId, ProgramKind, TextureId};

use super::context::GpuContext;
use super::matrix::TransformMatrix;

/// Draws a source texture as a full-viewport quad into the current surface.
///
/// Every device call is followed by an error check; a pending device error is
/// returned as `GraphicsOperation` and is fatal for the owning task.
#[derive(Debug)]
pub struct FrameRelay {
    program: ProgramId,
    kind: ProgramKind,
    released: bool,
}

impl FrameRelay {
    pub fn new<G: GraphicsDevice>(ctx: &mut GpuContext<G>, kind: ProgramKind) -> Result<Self, CaptureError> {
        let program = ctx.device_mut().create_program(kind)?;
        ctx.check_error("create_program")?;
        Ok(Self {
            program,
            kind,
            released: false,
        })
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    /// Allocate a texture whose target matches this relay's program.
    pub fn create_source_texture<G: GraphicsDevice>(&self, ctx: &mut GpuContext<G>) -> Result<TextureId, CaptureError> {
        self.ensure_live()?;
        let texture = ctx.device_mut().create_texture(self.kind.texture_target());
        ctx.check_error("create_texture")?;
        Ok(texture)
    }

    pub fn draw_frame<G: GraphicsDevice>(
        &self,
        ctx: &mut GpuContext<G>,
        texture: TextureId,
        tex_matrix: &TransformMatrix,
    ) -> Result<(), CaptureError> {
        self.ensure_live()?;
        ctx.device_mut().draw_quad(self.program, texture, &TransformMatrix::IDENTITY, tex_matrix);
        ctx.check_error("draw_frame")
    }

    /// Free the program. Safe to call twice.
    pub fn release<G: GraphicsDevice>(&mut self, ctx: &mut GpuContext<G>) {
        if !self.released {
            self.released = true;
            ctx.device_mut().delete_program(self.program);
        }
    }

    fn ensure_live(&self) -> Result<(), CaptureError> {
        if self.released {
            Err(CaptureError::UseAfterRelease("frame relay"))
        } else {
            Ok(())
        }
    }
}
