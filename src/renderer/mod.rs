//! Graphics abstraction layer.
//!
//! *The core never owns a graphics context.*  Everything it needs from the
//! immediate-mode API (projection, look-at, render targets, texture copies,
//! the attribute stack) goes through the [`Gpu`] trait, so the portal
//! protocol and the render contract run unchanged on the CPU rasteriser in
//! [`software`] or on any GL-like back-end.
//!
//! Errors follow the GL model: commands never fail directly, they leave a
//! pending [`GlError`] that [`check`] drains, logs with a location tag and
//! turns into a [`RenderError`].

use bitflags::bitflags;
use glam::{DVec2, DVec3};
use thiserror::Error;

/// Pixel format of every colour buffer and texture (0xAARRGGBB).
pub type Rgba = u32;

/// Opaque handle to a texture owned by the back-end.
pub type TextureId = u32;

/// Opaque handle to an off-screen render target owned by the back-end.
pub type FramebufferId = u32;

/// Which window colour buffer a draw or read command addresses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorBuffer {
    Front,
    #[default]
    Back,
}

bitflags! {
    /// State groups saved by [`Gpu::push_attrib`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttribMask: u32 {
        /// Draw buffer selection.
        const COLOR_BUFFER = 0x4000;
        /// Read buffer selection.
        const PIXEL_MODE   = 0x0020;
        const VIEWPORT     = 0x0800;
    }
}

/// Graphics-API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GlError {
    #[error("Invalid enum")]
    InvalidEnum,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Invalid operation")]
    InvalidOperation,
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Invalid framebuffer operation")]
    InvalidFramebufferOperation,
    #[error("Unknown error (0x{0:04x})")]
    Unknown(u32),
}

/// A detected graphics error and where it was noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{location}: GL error: {source}")]
pub struct RenderError {
    pub location: &'static str,
    #[source]
    pub source: GlError,
}

/// The immediate-mode graphics surface the core renders through.
pub trait Gpu {
    /// Pop the oldest pending error, if any (`glGetError`).
    fn take_error(&mut self) -> Option<GlError>;

    /// Can off-screen framebuffers be created?
    fn supports_framebuffers(&self) -> bool;

    /* ---------------------------- resources ---------------------------- */

    /// Allocate an empty `w × h` texture.
    fn create_texture(&mut self, w: usize, h: usize) -> TextureId;

    /// Replace level 0 of the currently bound texture.
    fn upload_texture(&mut self, w: usize, h: usize, pixels: &[Rgba]);

    /// Create an off-screen target whose colour attachment is `colour`.
    fn create_framebuffer(&mut self, colour: TextureId) -> FramebufferId;

    /* ------------------------------ state ------------------------------ */

    fn viewport(&mut self, x: i32, y: i32, w: usize, h: usize);

    /// Perspective projection; `fov_deg` is the vertical field of view.
    fn set_projection(&mut self, fov_deg: f64, aspect: f64, near: f64, far: f64);

    fn look_at(&mut self, eye: DVec3, target: DVec3, up: DVec3);

    /// `None` restores the window's default target.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn draw_buffer(&mut self, buffer: ColorBuffer);

    fn read_buffer(&mut self, buffer: ColorBuffer);

    fn push_attrib(&mut self, mask: AttribMask);

    fn pop_attrib(&mut self);

    /// `None` disables texturing.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /* ----------------------------- commands ---------------------------- */

    fn clear_depth(&mut self);

    /// Copy the lower-left `w × h` of the read buffer into the bound texture.
    fn copy_to_texture(&mut self, w: usize, h: usize);

    /// Rebuild the mip chain of the bound texture from level 0.
    fn generate_mipmaps(&mut self);

    fn flush(&mut self);

    /* ---------------------- primitives for draw-world --------------------- */

    /// One quad, textured by the bound texture (if any) modulated by `colour`.
    fn draw_quad(&mut self, corners: &[DVec3; 4], uvs: &[DVec2; 4], colour: Rgba);

    /// Axis-aligned ellipsoid, untextured.
    fn draw_ellipsoid(&mut self, centre: DVec3, radii: DVec3, colour: Rgba);
}

/// Drain one pending error; log and return it tagged with `location`.
pub fn check<G: Gpu + ?Sized>(gpu: &mut G, location: &'static str) -> Result<(), RenderError> {
    match gpu.take_error() {
        None => Ok(()),
        Some(source) => {
            let err = RenderError { location, source };
            log::error!("{err}");
            Err(err)
        }
    }
}

pub mod portal;
pub mod software;
mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use portal::{Capture, PortalSystem, portal_corners, portal_on_wall, synthetic_fov};
pub use software::Software;
pub use view::{FAR_PLANE, NEAR_PLANE, render_view};
