//! ---------------------------------------------------------------------------
//! CPU rasteriser behind the [`Gpu`] trait
//!
//! * Colour buffers hold **0xAARRGGBB** pixels stored bottom-up (row 0 is the
//!   bottom of the image) so viewports and pixel copies use GL coordinates.
//! * Triangles are clipped against the near plane, depth-tested and
//!   textured with nearest sampling from a per-triangle mip level.
//! * Errors are sticky: the first bad command sets a pending [`GlError`]
//!   that [`Gpu::take_error`] hands out once.
//! ---------------------------------------------------------------------------

use std::mem;

use glam::{DMat4, DVec2, DVec3, DVec4};
use smallvec::SmallVec;

use super::{AttribMask, ColorBuffer, FramebufferId, GlError, Gpu, Rgba, TextureId};

/// Colour a fresh back buffer starts with.
const CLEAR_COLOUR: Rgba = 0xFF_20_20_20;
/// Depth of the attribute stack, as in classic GL.
const ATTRIB_STACK_DEPTH: usize = 16;
/// Tessellation of [`Gpu::draw_ellipsoid`].
const ELLIPSOID_STACKS: usize = 16;
const ELLIPSOID_SLICES: usize = 16;

/*───────────────────────────────────────────────────────────────────────*/
/*                              Resources                               */
/*───────────────────────────────────────────────────────────────────────*/

#[derive(Clone, Debug, Default)]
struct Image {
    w: usize,
    h: usize,
    pixels: Vec<Rgba>,
}

impl Image {
    fn blank(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            pixels: vec![0; w * h],
        }
    }

    /// 2×2 box filter.
    fn downsample(&self) -> Self {
        let (w, h) = ((self.w / 2).max(1), (self.h / 2).max(1));
        let mut pixels = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let xs = [(2 * x).min(self.w - 1), (2 * x + 1).min(self.w - 1)];
                let ys = [(2 * y).min(self.h - 1), (2 * y + 1).min(self.h - 1)];
                let mut sum = [0u32; 4];
                for sy in ys {
                    for sx in xs {
                        let px = self.pixels[sy * self.w + sx];
                        for (c, s) in sum.iter_mut().enumerate() {
                            *s += (px >> (c * 8)) & 0xFF;
                        }
                    }
                }
                let avg = sum
                    .iter()
                    .enumerate()
                    .fold(0u32, |acc, (c, s)| acc | (((s + 2) / 4) << (c * 8)));
                pixels.push(avg);
            }
        }
        Self { w, h, pixels }
    }

    /// Nearest texel with wrap-around addressing.  `None` while the image
    /// is being rendered into.
    fn sample(&self, uv: DVec2) -> Option<Rgba> {
        if self.w == 0 || self.h == 0 || self.pixels.len() != self.w * self.h {
            return None;
        }
        let x = ((uv.x * self.w as f64).floor() as i64).rem_euclid(self.w as i64) as usize;
        let y = ((uv.y * self.h as f64).floor() as i64).rem_euclid(self.h as i64) as usize;
        Some(self.pixels[y * self.w + x])
    }
}

/// A texture and its mip chain; `levels[0]` is the full-size image.
#[derive(Clone, Debug)]
struct Texture {
    levels: Vec<Image>,
}

impl Texture {
    fn generate_mipmaps(&mut self) {
        self.levels.truncate(1);
        loop {
            let next = match self.levels.last() {
                Some(last) if last.w > 1 || last.h > 1 => {
                    if last.w == 0 || last.h == 0 {
                        break;
                    }
                    last.downsample()
                }
                _ => break,
            };
            self.levels.push(next);
        }
    }
}

#[derive(Clone, Debug)]
struct Framebuffer {
    colour: TextureId,
    depth: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Viewport {
    x: i32,
    y: i32,
    w: usize,
    h: usize,
}

/// State saved by one `push_attrib`.
#[derive(Clone, Copy, Debug)]
struct Saved {
    mask: AttribMask,
    draw: ColorBuffer,
    read: ColorBuffer,
    viewport: Viewport,
}

/// The image being drawn into, detached from `self` while a primitive is
/// rasterised so textures can be sampled at the same time.
struct Surface {
    target: Target,
    w: usize,
    h: usize,
    pixels: Vec<Rgba>,
    depth: Vec<f64>,
}

#[derive(Clone, Copy)]
enum Target {
    Window(ColorBuffer),
    Texture { texture: usize, framebuffer: usize },
}

/*───────────────────────────────────────────────────────────────────────*/
/*                              Backend                                 */
/*───────────────────────────────────────────────────────────────────────*/

/// Software implementation of the graphics surface.
pub struct Software {
    width: usize,
    height: usize,
    back: Vec<Rgba>,
    front: Vec<Rgba>,
    depth: Vec<f64>,
    flipped: Vec<Rgba>,

    textures: Vec<Texture>,
    framebuffers: Vec<Framebuffer>,

    bound_texture: Option<TextureId>,
    bound_framebuffer: Option<FramebufferId>,
    draw: ColorBuffer,
    read: ColorBuffer,
    viewport: Viewport,
    projection: DMat4,
    view: DMat4,
    stack: Vec<Saved>,

    pending: Option<GlError>,
}

impl Software {
    pub fn new(width: usize, height: usize) -> Self {
        let mut sw = Self {
            width: 0,
            height: 0,
            back: Vec::new(),
            front: Vec::new(),
            depth: Vec::new(),
            flipped: Vec::new(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
            bound_texture: None,
            bound_framebuffer: None,
            draw: ColorBuffer::Back,
            read: ColorBuffer::Back,
            viewport: Viewport {
                x: 0,
                y: 0,
                w: width,
                h: height,
            },
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
            stack: Vec::new(),
            pending: None,
        };
        sw.resize(width, height);
        sw
    }

    #[inline]
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Reallocate the window buffers; contents are lost.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.back = vec![CLEAR_COLOUR; width * height];
        self.front = vec![CLEAR_COLOUR; width * height];
        self.depth = vec![1.0; width * height];
    }

    /// Swap the back buffer to the front and hand it to `submit`, top row
    /// first (the layout window toolkits expect).
    pub fn present<R>(&mut self, submit: impl FnOnce(&[Rgba], usize, usize) -> R) -> R {
        mem::swap(&mut self.front, &mut self.back);
        self.back.fill(CLEAR_COLOUR);

        self.flipped.clear();
        for row in self.front.chunks_exact(self.width.max(1)).rev() {
            self.flipped.extend_from_slice(row);
        }
        submit(&self.flipped, self.width, self.height)
    }

    /// One window pixel, `y` counted from the bottom.
    pub fn read_pixel(&self, buffer: ColorBuffer, x: usize, y: usize) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let pixels = match buffer {
            ColorBuffer::Back => &self.back,
            ColorBuffer::Front => &self.front,
        };
        pixels.get(y * self.width + x).copied()
    }

    /// Pixels of one mip level of a texture, bottom row first.
    pub fn texture_level(&self, id: TextureId, level: usize) -> Option<(&[Rgba], usize, usize)> {
        let image = self.textures.get(slot(id)?)?.levels.get(level)?;
        Some((&image.pixels, image.w, image.h))
    }

    pub fn mip_levels(&self, id: TextureId) -> usize {
        slot(id)
            .and_then(|i| self.textures.get(i))
            .map_or(0, |t| t.levels.len())
    }

    /*──────────────────────── internals ────────────────────────*/

    /// Record `err` unless an earlier error is still pending.
    fn raise(&mut self, err: GlError) {
        self.pending.get_or_insert(err);
    }

    fn texture_index(&self, id: TextureId) -> Option<usize> {
        slot(id).filter(|&i| i < self.textures.len())
    }

    fn framebuffer_index(&self, id: FramebufferId) -> Option<usize> {
        slot(id).filter(|&i| i < self.framebuffers.len())
    }

    /// The bound texture, raising `InvalidOperation` when there is none.
    fn bound_texture_index(&mut self) -> Option<usize> {
        let index = self.bound_texture.and_then(|id| self.texture_index(id));
        if index.is_none() {
            self.raise(GlError::InvalidOperation);
        }
        index
    }

    fn take_target(&mut self) -> Option<Surface> {
        match self.bound_framebuffer {
            None => {
                let pixels = match self.draw {
                    ColorBuffer::Back => mem::take(&mut self.back),
                    ColorBuffer::Front => mem::take(&mut self.front),
                };
                Some(Surface {
                    target: Target::Window(self.draw),
                    w: self.width,
                    h: self.height,
                    pixels,
                    depth: mem::take(&mut self.depth),
                })
            }
            Some(id) => {
                let Some(fb) = self.framebuffer_index(id) else {
                    self.raise(GlError::InvalidFramebufferOperation);
                    return None;
                };
                let Some(tex) = self.texture_index(self.framebuffers[fb].colour) else {
                    self.raise(GlError::InvalidFramebufferOperation);
                    return None;
                };
                let image = &mut self.textures[tex].levels[0];
                let (w, h) = (image.w, image.h);
                let pixels = mem::take(&mut image.pixels);
                let mut depth = mem::take(&mut self.framebuffers[fb].depth);
                depth.resize(w * h, 1.0);
                Some(Surface {
                    target: Target::Texture {
                        texture: tex,
                        framebuffer: fb,
                    },
                    w,
                    h,
                    pixels,
                    depth,
                })
            }
        }
    }

    fn restore_target(&mut self, surface: Surface) {
        match surface.target {
            Target::Window(ColorBuffer::Back) => self.back = surface.pixels,
            Target::Window(ColorBuffer::Front) => self.front = surface.pixels,
            Target::Texture {
                texture,
                framebuffer,
            } => {
                self.textures[texture].levels[0].pixels = surface.pixels;
                self.framebuffers[framebuffer].depth = surface.depth;
                return;
            }
        }
        self.depth = surface.depth;
    }

    /// Clip, project and fill one convex polygon.
    fn draw_polygon(
        &mut self,
        points: &[DVec3],
        uvs: &[DVec2],
        colour: Rgba,
        texture: Option<TextureId>,
    ) {
        let mvp = self.projection * self.view;
        let polygon: Polygon = points
            .iter()
            .zip(uvs)
            .map(|(p, uv)| ClipVert {
                clip: mvp * p.extend(1.0),
                uv: *uv,
            })
            .collect();
        let polygon = clip_near(&polygon);
        if polygon.len() < 3 {
            return;
        }

        let Some(mut surface) = self.take_target() else {
            return;
        };
        let viewport = self.viewport;
        let sampler = texture
            .and_then(|id| self.texture_index(id))
            .map(|i| &self.textures[i]);

        let screen: SmallVec<[ScreenVert; 8]> = polygon
            .iter()
            .map(|v| ScreenVert::project(v, &viewport))
            .collect();
        for k in 1..screen.len() - 1 {
            fill_triangle(
                &mut surface,
                &viewport,
                [screen[0], screen[k], screen[k + 1]],
                sampler,
                colour,
            );
        }
        self.restore_target(surface);
    }
}

/// Handles are 1-based so that 0 can mean "none".
#[inline]
fn slot(id: u32) -> Option<usize> {
    (id as usize).checked_sub(1)
}

/*──────────────────────── Gpu trait impl ────────────────────────*/

impl Gpu for Software {
    fn take_error(&mut self) -> Option<GlError> {
        self.pending.take()
    }

    fn supports_framebuffers(&self) -> bool {
        true
    }

    fn create_texture(&mut self, w: usize, h: usize) -> TextureId {
        self.textures.push(Texture {
            levels: vec![Image::blank(w, h)],
        });
        self.textures.len() as TextureId
    }

    fn upload_texture(&mut self, w: usize, h: usize, pixels: &[Rgba]) {
        if pixels.len() != w * h {
            self.raise(GlError::InvalidValue);
            return;
        }
        let Some(tex) = self.bound_texture_index() else {
            return;
        };
        self.textures[tex].levels = vec![Image {
            w,
            h,
            pixels: pixels.to_vec(),
        }];
    }

    fn create_framebuffer(&mut self, colour: TextureId) -> FramebufferId {
        if self.texture_index(colour).is_none() {
            self.raise(GlError::InvalidValue);
            return 0;
        }
        self.framebuffers.push(Framebuffer {
            colour,
            depth: Vec::new(),
        });
        self.framebuffers.len() as FramebufferId
    }

    fn viewport(&mut self, x: i32, y: i32, w: usize, h: usize) {
        self.viewport = Viewport { x, y, w, h };
    }

    fn set_projection(&mut self, fov_deg: f64, aspect: f64, near: f64, far: f64) {
        let valid = fov_deg > 0.0 && fov_deg <= 180.0 && aspect > 0.0 && near > 0.0 && far > near;
        if !valid {
            self.raise(GlError::InvalidValue);
            return;
        }
        self.projection = DMat4::perspective_rh_gl(fov_deg.to_radians(), aspect, near, far);
    }

    fn look_at(&mut self, eye: DVec3, target: DVec3, up: DVec3) {
        self.view = DMat4::look_at_rh(eye, target, up);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        match framebuffer {
            Some(id) if self.framebuffer_index(id).is_none() => {
                self.raise(GlError::InvalidOperation)
            }
            _ => self.bound_framebuffer = framebuffer,
        }
    }

    fn draw_buffer(&mut self, buffer: ColorBuffer) {
        self.draw = buffer;
    }

    fn read_buffer(&mut self, buffer: ColorBuffer) {
        self.read = buffer;
    }

    fn push_attrib(&mut self, mask: AttribMask) {
        if self.stack.len() >= ATTRIB_STACK_DEPTH {
            self.raise(GlError::StackOverflow);
            return;
        }
        self.stack.push(Saved {
            mask,
            draw: self.draw,
            read: self.read,
            viewport: self.viewport,
        });
    }

    fn pop_attrib(&mut self) {
        let Some(saved) = self.stack.pop() else {
            self.raise(GlError::StackUnderflow);
            return;
        };
        if saved.mask.contains(AttribMask::COLOR_BUFFER) {
            self.draw = saved.draw;
        }
        if saved.mask.contains(AttribMask::PIXEL_MODE) {
            self.read = saved.read;
        }
        if saved.mask.contains(AttribMask::VIEWPORT) {
            self.viewport = saved.viewport;
        }
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        match texture {
            Some(id) if self.texture_index(id).is_none() => self.raise(GlError::InvalidOperation),
            _ => self.bound_texture = texture,
        }
    }

    fn clear_depth(&mut self) {
        match self.bound_framebuffer {
            None => self.depth.fill(1.0),
            Some(id) => {
                let Some(fb) = self.framebuffer_index(id) else {
                    self.raise(GlError::InvalidFramebufferOperation);
                    return;
                };
                let size = self
                    .texture_index(self.framebuffers[fb].colour)
                    .map_or(0, |t| {
                        let image = &self.textures[t].levels[0];
                        image.w * image.h
                    });
                let depth = &mut self.framebuffers[fb].depth;
                depth.clear();
                depth.resize(size, 1.0);
            }
        }
    }

    fn copy_to_texture(&mut self, w: usize, h: usize) {
        let Some(tex) = self.bound_texture_index() else {
            return;
        };

        // a bound framebuffer is read instead of the window
        let source = match self.bound_framebuffer {
            None => {
                let pixels = match self.read {
                    ColorBuffer::Back => &self.back,
                    ColorBuffer::Front => &self.front,
                };
                Some((pixels.as_slice(), self.width, self.height))
            }
            Some(id) => self
                .framebuffer_index(id)
                .and_then(|fb| self.texture_index(self.framebuffers[fb].colour))
                .map(|t| {
                    let image = &self.textures[t].levels[0];
                    (image.pixels.as_slice(), image.w, image.h)
                }),
        };
        // the rectangle is clipped to the read buffer; texels it misses keep
        // whatever the texture held before
        let copied = match source {
            None => Err(GlError::InvalidFramebufferOperation),
            Some((src, sw, sh)) if src.len() != sw * sh => Err(GlError::InvalidValue),
            Some((src, sw, sh)) => {
                let (cw, ch) = (w.min(sw), h.min(sh));
                let rows: Vec<Rgba> = src
                    .chunks_exact(sw.max(1))
                    .take(ch)
                    .flat_map(|row| row[..cw].iter().copied())
                    .collect();
                Ok((rows, cw))
            }
        };
        let (rows, cw) = match copied {
            Ok(copied) => copied,
            Err(err) => return self.raise(err),
        };

        let texture = &mut self.textures[tex];
        texture.levels.truncate(1);
        if !texture.levels.first().is_some_and(|l| l.w == w && l.h == h) {
            texture.levels = vec![Image::blank(w, h)];
        }
        let image = &mut texture.levels[0];
        if cw > 0 {
            for (y, row) in rows.chunks_exact(cw).enumerate() {
                image.pixels[y * w..y * w + cw].copy_from_slice(row);
            }
        }
    }

    fn generate_mipmaps(&mut self) {
        if let Some(tex) = self.bound_texture_index() {
            self.textures[tex].generate_mipmaps();
        }
    }

    fn flush(&mut self) {}

    fn draw_quad(&mut self, corners: &[DVec3; 4], uvs: &[DVec2; 4], colour: Rgba) {
        self.draw_polygon(corners, uvs, colour, self.bound_texture);
    }

    fn draw_ellipsoid(&mut self, centre: DVec3, radii: DVec3, colour: Rgba) {
        use std::f64::consts::{PI, TAU};

        let light = DVec3::new(0.3, 1.0, 0.5).normalize();
        let unit = |stack: usize, slice: usize| {
            let theta = PI * stack as f64 / ELLIPSOID_STACKS as f64;
            let phi = TAU * slice as f64 / ELLIPSOID_SLICES as f64;
            DVec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
        };
        let uvs = [DVec2::ZERO; 4];

        for i in 0..ELLIPSOID_STACKS {
            for j in 0..ELLIPSOID_SLICES {
                let face = [unit(i, j), unit(i + 1, j), unit(i + 1, j + 1), unit(i, j + 1)];
                let normal = (face.iter().copied().sum::<DVec3>() / radii).normalize_or_zero();
                let shade = 0.35 + 0.65 * normal.dot(light).max(0.0);
                let corners = face.map(|p| centre + p * radii);
                self.draw_polygon(&corners, &uvs, scale(colour, shade), None);
            }
        }
    }
}

/*──────────────────────── rasterisation ────────────────────────*/

#[derive(Clone, Copy, Debug)]
struct ClipVert {
    clip: DVec4,
    uv: DVec2,
}

type Polygon = SmallVec<[ClipVert; 8]>;

/// Sutherland–Hodgman against the near plane (`z >= -w`).
fn clip_near(polygon: &[ClipVert]) -> Polygon {
    let dist = |v: &ClipVert| v.clip.z + v.clip.w;
    let mut out = Polygon::new();
    for (i, a) in polygon.iter().enumerate() {
        let b = &polygon[(i + 1) % polygon.len()];
        let (da, db) = (dist(a), dist(b));
        if da >= 0.0 {
            out.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(ClipVert {
                clip: a.clip.lerp(b.clip, t),
                uv: a.uv.lerp(b.uv, t),
            });
        }
    }
    out
}

/// Window-space vertex with perspective-correct attributes.
#[derive(Clone, Copy, Debug)]
struct ScreenVert {
    x: f64,
    y: f64,
    z: f64,
    inv_w: f64,
    uv_w: DVec2,
}

impl ScreenVert {
    fn project(v: &ClipVert, vp: &Viewport) -> Self {
        let inv_w = 1.0 / v.clip.w;
        let ndc = v.clip.truncate() * inv_w;
        Self {
            x: vp.x as f64 + (ndc.x + 1.0) * 0.5 * vp.w as f64,
            y: vp.y as f64 + (ndc.y + 1.0) * 0.5 * vp.h as f64,
            z: (ndc.z + 1.0) * 0.5,
            inv_w,
            uv_w: v.uv * inv_w,
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.inv_w.is_finite()
    }
}

#[inline]
fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn fill_triangle(
    surface: &mut Surface,
    vp: &Viewport,
    tri: [ScreenVert; 3],
    texture: Option<&Texture>,
    colour: Rgba,
) {
    if !tri.iter().all(ScreenVert::is_finite) {
        return;
    }
    let [a, b, c] = tri.map(|v| (v.x, v.y));
    let area = edge(a, b, c);
    if area.abs() < 1e-12 {
        return;
    }

    let image = texture.map(|t| &t.levels[mip_level(t, &tri, area)]);

    let x_lo = (vp.x.max(0) as f64).max(a.0.min(b.0).min(c.0).floor()) as usize;
    let y_lo = (vp.y.max(0) as f64).max(a.1.min(b.1).min(c.1).floor()) as usize;
    let x_hi = ((vp.x as f64 + vp.w as f64).min(surface.w as f64))
        .min(a.0.max(b.0).max(c.0).ceil())
        .max(0.0) as usize;
    let y_hi = ((vp.y as f64 + vp.h as f64).min(surface.h as f64))
        .min(a.1.max(b.1).max(c.1).ceil())
        .max(0.0) as usize;

    for py in y_lo..y_hi {
        for px in x_lo..x_hi {
            let p = (px as f64 + 0.5, py as f64 + 0.5);
            let l0 = edge(b, c, p) / area;
            let l1 = edge(c, a, p) / area;
            let l2 = edge(a, b, p) / area;
            if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                continue;
            }
            let z = l0 * tri[0].z + l1 * tri[1].z + l2 * tri[2].z;
            let i = py * surface.w + px;
            if !(0.0..=1.0).contains(&z) || z >= surface.depth[i] {
                continue;
            }

            let texel = image.and_then(|img| {
                let inv_w = l0 * tri[0].inv_w + l1 * tri[1].inv_w + l2 * tri[2].inv_w;
                let uv = (tri[0].uv_w * l0 + tri[1].uv_w * l1 + tri[2].uv_w * l2) / inv_w;
                img.sample(uv)
            });
            surface.depth[i] = z;
            surface.pixels[i] = match texel {
                Some(t) => modulate(t, colour),
                None => colour,
            };
        }
    }
}

/// Mip level whose texel density best matches the triangle's screen size.
fn mip_level(texture: &Texture, tri: &[ScreenVert; 3], screen_area: f64) -> usize {
    let Some(base) = texture.levels.first() else {
        return 0;
    };
    let uv = tri.map(|v| v.uv_w / v.inv_w);
    let uv_area = edge((uv[0].x, uv[0].y), (uv[1].x, uv[1].y), (uv[2].x, uv[2].y)).abs();
    let texel_area = uv_area * (base.w * base.h) as f64;
    let ratio = texel_area / screen_area.abs();
    if !ratio.is_finite() || ratio <= 1.0 {
        return 0;
    }
    ((0.5 * ratio.log2()).floor() as usize).min(texture.levels.len() - 1)
}

/// Per-channel multiply of two colours; alpha is forced opaque.
fn modulate(a: Rgba, b: Rgba) -> Rgba {
    let ch = |c: u32| (((a >> c) & 0xFF) * ((b >> c) & 0xFF) + 127) / 255;
    0xFF00_0000 | (ch(16) << 16) | (ch(8) << 8) | ch(0)
}

fn scale(colour: Rgba, f: f64) -> Rgba {
    let ch = |c: u32| ((((colour >> c) & 0xFF) as f64 * f).round() as u32).min(255);
    0xFF00_0000 | (ch(16) << 16) | (ch(8) << 8) | ch(0)
}

/*──────────────────────────────── Tests ───────────────────────────────*/
