//! Rendering-context plumbing for the frame relay: context and surface
//! lifetimes, the blit pipeline, and the external source texture.

pub mod context;
pub mod matrix;
pub mod relay;
pub mod source;
pub mod surface;
