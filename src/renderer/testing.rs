//! Recording [`Gpu`] double for unit tests.

use glam::{DVec2, DVec3};

use super::{AttribMask, ColorBuffer, FramebufferId, GlError, Gpu, Rgba, TextureId};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateTexture { w: usize, h: usize },
    Upload,
    CreateFramebuffer(TextureId),
    Viewport { w: usize, h: usize },
    Projection { fov: f64, aspect: f64 },
    LookAt { eye: DVec3, target: DVec3, up: DVec3 },
    BindFramebuffer(Option<FramebufferId>),
    DrawBuffer(ColorBuffer),
    ReadBuffer(ColorBuffer),
    PushAttrib(AttribMask),
    PopAttrib,
    BindTexture(Option<TextureId>),
    ClearDepth,
    CopyToTexture { w: usize, h: usize },
    GenerateMipmaps,
    Flush,
    Quad,
    Ellipsoid,
}

/// Logs every command and tracks the buffer state the portal
/// fallback must restore.
pub struct RecordingGpu {
    pub calls: Vec<Call>,
    pub framebuffers: bool,
    pub draw: ColorBuffer,
    pub read: ColorBuffer,
    stack: Vec<(ColorBuffer, ColorBuffer)>,
    pending: Option<GlError>,
    fail_at: Option<(usize, GlError)>,
    next_handle: u32,
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            framebuffers: true,
            draw: ColorBuffer::Front,
            read: ColorBuffer::Front,
            stack: Vec::new(),
            pending: None,
            fail_at: None,
            next_handle: 1,
        }
    }
}

impl RecordingGpu {
    /// Raise `err` when the `index`-th call (0-based) is recorded.
    pub fn failing_at(index: usize, err: GlError) -> Self {
        Self {
            fail_at: Some((index, err)),
            ..Self::default()
        }
    }

    /// A back-end that reports no framebuffer support.
    pub fn without_framebuffers() -> Self {
        Self {
            framebuffers: false,
            ..Self::default()
        }
    }

    pub fn inject(&mut self, err: GlError) {
        self.pending.get_or_insert(err);
    }

    fn record(&mut self, call: Call) {
        if let Some((index, err)) = self.fail_at {
            if index == self.calls.len() {
                self.inject(err);
            }
        }
        self.calls.push(call);
    }

    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle - 1
    }
}

impl Gpu for RecordingGpu {
    fn take_error(&mut self) -> Option<GlError> {
        self.pending.take()
    }

    fn supports_framebuffers(&self) -> bool {
        self.framebuffers
    }

    fn create_texture(&mut self, w: usize, h: usize) -> TextureId {
        self.record(Call::CreateTexture { w, h });
        self.handle()
    }

    fn upload_texture(&mut self, _: usize, _: usize, _: &[Rgba]) {
        self.record(Call::Upload);
    }

    fn create_framebuffer(&mut self, colour: TextureId) -> FramebufferId {
        self.record(Call::CreateFramebuffer(colour));
        self.handle()
    }

    fn viewport(&mut self, _: i32, _: i32, w: usize, h: usize) {
        self.record(Call::Viewport { w, h });
    }

    fn set_projection(&mut self, fov: f64, aspect: f64, _: f64, _: f64) {
        self.record(Call::Projection { fov, aspect });
    }

    fn look_at(&mut self, eye: DVec3, target: DVec3, up: DVec3) {
        self.record(Call::LookAt { eye, target, up });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.record(Call::BindFramebuffer(framebuffer));
    }

    fn draw_buffer(&mut self, buffer: ColorBuffer) {
        self.draw = buffer;
        self.record(Call::DrawBuffer(buffer));
    }

    fn read_buffer(&mut self, buffer: ColorBuffer) {
        self.read = buffer;
        self.record(Call::ReadBuffer(buffer));
    }

    fn push_attrib(&mut self, mask: AttribMask) {
        self.stack.push((self.draw, self.read));
        self.record(Call::PushAttrib(mask));
    }

    fn pop_attrib(&mut self) {
        match self.stack.pop() {
            Some((draw, read)) => {
                self.draw = draw;
                self.read = read;
            }
            None => self.inject(GlError::StackUnderflow),
        }
        self.record(Call::PopAttrib);
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.record(Call::BindTexture(texture));
    }

    fn clear_depth(&mut self) {
        self.record(Call::ClearDepth);
    }

    fn copy_to_texture(&mut self, w: usize, h: usize) {
        self.record(Call::CopyToTexture { w, h });
    }

    fn generate_mipmaps(&mut self) {
        self.record(Call::GenerateMipmaps);
    }

    fn flush(&mut self) {
        self.record(Call::Flush);
    }

    fn draw_quad(&mut self, _: &[DVec3; 4], _: &[DVec2; 4], _: Rgba) {
        self.record(Call::Quad);
    }

    fn draw_ellipsoid(&mut self, _: DVec3, _: DVec3, _: Rgba) {
        self.record(Call::Ellipsoid);
    }
}
