//! CPU rasteriser implementing [`GraphicsDevice`].
//!
//! Surfaces are plain RGBA buffers. Window surfaces hand their buffer to the
//! encoder input sink on every swap. Drawing follows GL conventions: texture
//! coordinates have `t = 0` at the bottom row, and failures are reported
//! through the error flag rather than a return value.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use screen_record_core::models::error::CaptureError;
use screen_record_core::models::media::VideoFrame;
use screen_record_core::traits::encoder::EncoderInput;
use screen_record_core::traits::graphics::{
    ContextId, GraphicsDevice, ProgramId, ProgramKind, SurfaceId, TextureId, TextureTarget, INVALID_OPERATION,
    INVALID_VALUE, NO_ERROR,
};
use screen_record_core::TransformMatrix;

/// Live object counts, used to verify teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub contexts: usize,
    pub surfaces: usize,
    pub textures: usize,
    pub programs: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    window: Option<EncoderInput>,
    presentation_ns: i64,
}

struct Texture {
    target: TextureTarget,
    image: Option<VideoFrame>,
}

#[derive(Default)]
struct GpuState {
    next_id: u32,
    contexts: HashMap<ContextId, ()>,
    surfaces: HashMap<SurfaceId, Surface>,
    textures: HashMap<TextureId, Texture>,
    programs: HashMap<ProgramId, ProgramKind>,
    current: Option<SurfaceId>,
    error: u32,
    frames_presented: u64,
}

impl GpuState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn set_error(&mut self, code: u32) {
        // GL keeps the first error until it is read.
        if self.error == NO_ERROR {
            self.error = code;
        }
    }
}

/// Software graphics device. Clones share the same object tables, so a
/// clone kept outside the render thread can observe resource counts.
#[derive(Clone, Default)]
pub struct SoftGpu {
    state: Arc<Mutex<GpuState>>,
}

impl SoftGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_counts(&self) -> ResourceCounts {
        let state = self.state.lock();
        ResourceCounts {
            contexts: state.contexts.len(),
            surfaces: state.surfaces.len(),
            textures: state.textures.len(),
            programs: state.programs.len(),
        }
    }

    /// Buffers handed to encoder sinks so far.
    pub fn frames_presented(&self) -> u64 {
        self.state.lock().frames_presented
    }

    /// Copy of the pixels of `surface`, rows top to bottom.
    pub fn read_pixels(&self, surface: SurfaceId) -> Option<Vec<u32>> {
        self.state.lock().surfaces.get(&surface).map(|s| s.pixels.clone())
    }
}

fn pack_rgba(rgba: [f32; 4]) -> u32 {
    rgba.iter()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u32)
        .fold(0, |acc, c| (acc << 8) | c)
}

/// Destination pixel rectangle covered by the unit quad under `mvp`.
fn quad_bounds(mvp: &TransformMatrix, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (x0, y0) = mvp.transform_point(-1.0, -1.0);
    let (x1, y1) = mvp.transform_point(1.0, 1.0);
    let to_px = |ndc: f32, size: u32| (((ndc + 1.0) * 0.5 * size as f32).round().max(0.0) as u32).min(size);
    let (left, right) = (to_px(x0.min(x1), width), to_px(x0.max(x1), width));
    // NDC y grows upwards, rows grow downwards.
    let (top, bottom) = (
        height - to_px(y0.max(y1), height),
        height - to_px(y0.min(y1), height),
    );
    (left, top, right, bottom)
}

fn rasterise(dest: &mut Surface, image: &VideoFrame, mvp: &TransformMatrix, tex: &TransformMatrix) {
    let full_quad = *mvp == TransformMatrix::IDENTITY;
    if full_quad && *tex == TransformMatrix::FLIP_VERTICAL && image.width == dest.width && image.height == dest.height {
        dest.pixels.copy_from_slice(&image.pixels);
        return;
    }

    let (left, top, right, bottom) = quad_bounds(mvp, dest.width, dest.height);
    let (quad_w, quad_h) = ((right - left) as f32, (bottom - top) as f32);
    if quad_w == 0.0 || quad_h == 0.0 {
        return;
    }
    for y in top..bottom {
        let t = 1.0 - ((y - top) as f32 + 0.5) / quad_h;
        for x in left..right {
            let s = ((x - left) as f32 + 0.5) / quad_w;
            let (u, v) = tex.transform_point(s, t);
            // Memory row 0 sits at `t = 0`, as with uploaded images.
            let tx = ((u.clamp(0.0, 1.0) * image.width as f32) as u32).min(image.width - 1);
            let ty = ((v.clamp(0.0, 1.0) * image.height as f32) as u32).min(image.height - 1);
            dest.pixels[(y * dest.width + x) as usize] = image.pixel(tx, ty);
        }
    }
}

impl GraphicsDevice for SoftGpu {
    fn create_context(&mut self, shared: Option<ContextId>) -> Result<ContextId, CaptureError> {
        let mut state = self.state.lock();
        if let Some(shared) = shared {
            if !state.contexts.contains_key(&shared) {
                return Err(CaptureError::ContextCreation(format!("unknown shared context {:?}", shared)));
            }
        }
        let id = ContextId(state.next_id());
        state.contexts.insert(id, ());
        log::debug!("soft gpu: created context {:?}", id);
        Ok(id)
    }

    fn destroy_context(&mut self, context: ContextId) {
        let mut state = self.state.lock();
        if state.contexts.remove(&context).is_none() {
            log::warn!("soft gpu: destroying unknown context {:?}", context);
        }
        if state.contexts.is_empty() {
            state.current = None;
        }
    }

    fn create_offscreen_surface(
        &mut self,
        context: ContextId,
        width: u32,
        height: u32,
    ) -> Result<SurfaceId, CaptureError> {
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&context) {
            return Err(CaptureError::Bind("context"));
        }
        let id = SurfaceId(state.next_id());
        state.surfaces.insert(
            id,
            Surface {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
                window: None,
                presentation_ns: 0,
            },
        );
        Ok(id)
    }

    fn create_window_surface(&mut self, context: ContextId, input: &EncoderInput) -> Result<SurfaceId, CaptureError> {
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&context) {
            return Err(CaptureError::Bind("context"));
        }
        let id = SurfaceId(state.next_id());
        state.surfaces.insert(
            id,
            Surface {
                width: input.width,
                height: input.height,
                pixels: vec![0; (input.width * input.height) as usize],
                window: Some(input.clone()),
                presentation_ns: 0,
            },
        );
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let mut state = self.state.lock();
        state.surfaces.remove(&surface);
        if state.current == Some(surface) {
            state.current = None;
        }
    }

    fn make_current(&mut self, context: ContextId, surface: Option<SurfaceId>) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&context) {
            return Err(CaptureError::Bind("context"));
        }
        if let Some(id) = surface {
            if !state.surfaces.contains_key(&id) {
                return Err(CaptureError::Bind("surface"));
            }
        }
        state.current = surface;
        Ok(())
    }

    fn set_presentation_time(&mut self, surface: SurfaceId, nanos: i64) {
        if let Some(s) = self.state.lock().surfaces.get_mut(&surface) {
            s.presentation_ns = nanos;
        }
    }

    fn swap_buffers(&mut self, surface: SurfaceId) -> Result<(), CaptureError> {
        let (sink, frame) = {
            let mut state = self.state.lock();
            let s = state.surfaces.get(&surface).ok_or(CaptureError::Bind("surface"))?;
            let Some(window) = &s.window else {
                return Ok(());
            };
            let frame = VideoFrame::new(s.width, s.height, s.pixels.clone(), s.presentation_ns);
            let sink = Arc::clone(&window.sink);
            state.frames_presented += 1;
            (sink, frame)
        };
        let pts = frame.timestamp_ns;
        sink.queue_frame(frame, pts);
        Ok(())
    }

    fn create_texture(&mut self, target: TextureTarget) -> TextureId {
        let mut state = self.state.lock();
        let id = TextureId(state.next_id());
        state.textures.insert(id, Texture { target, image: None });
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.state.lock().textures.remove(&texture);
    }

    fn latch_external_image(&mut self, texture: TextureId, frame: &VideoFrame) -> TransformMatrix {
        let mut state = self.state.lock();
        match state.textures.get_mut(&texture) {
            Some(t) if t.target == TextureTarget::External => t.image = Some(frame.clone()),
            Some(_) => state.set_error(INVALID_OPERATION),
            None => state.set_error(INVALID_VALUE),
        }
        TransformMatrix::FLIP_VERTICAL
    }

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramId, CaptureError> {
        let mut state = self.state.lock();
        let id = ProgramId(state.next_id());
        state.programs.insert(id, kind);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.state.lock().programs.remove(&program);
    }

    fn draw_quad(&mut self, program: ProgramId, texture: TextureId, mvp: &TransformMatrix, tex_matrix: &TransformMatrix) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (Some(kind), Some(tex)) = (state.programs.get(&program), state.textures.get(&texture)) else {
            state.set_error(INVALID_VALUE);
            return;
        };
        if kind.texture_target() != tex.target {
            state.set_error(INVALID_OPERATION);
            return;
        }
        let Some(dest) = state.current.and_then(|id| state.surfaces.get_mut(&id)) else {
            state.set_error(INVALID_OPERATION);
            return;
        };
        match &tex.image {
            Some(image) => rasterise(dest, image, mvp, tex_matrix),
            // Sampling an incomplete texture yields black.
            None => dest.pixels.fill(0x0000_00ff),
        }
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.current.and_then(|id| state.surfaces.get_mut(&id)) {
            Some(dest) => dest.pixels.fill(pack_rgba(rgba)),
            None => state.set_error(INVALID_OPERATION),
        }
    }

    fn flush(&mut self) {}

    fn get_error(&mut self) -> u32 {
        std::mem::replace(&mut self.state.lock().error, NO_ERROR)
    }
}
