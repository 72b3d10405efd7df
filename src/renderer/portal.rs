//! Two linked portals and the per-frame view-synthesis passes.
//!
//! For each slot the *seen* portal displays what the *vista* portal (the
//! other slot) looks at.  The vista is rendered into a small square target
//! and captured into the seen portal's texture, either by rendering
//! straight into a framebuffer bound to that texture or by drawing into
//! the window's back buffer and copying the pixels out.
//!
//! Limitation: sight rays are not re-oriented between two portals that are
//! not coaxial.  Only the distance heuristic of [`synthetic_fov`] narrows
//! the vista camera as the viewer approaches; matching per-pixel rays
//! across differently oriented portals is not attempted.

use std::ops::{Deref, DerefMut};

use glam::{DMat3, DVec2, DVec3};

use super::{
    AttribMask, ColorBuffer, FramebufferId, Gpu, RenderError, TextureId, check, render_view,
    view::NEAR_PLANE,
};
use crate::config::Settings;
use crate::world::{Actor, Hit, PortalSlot, RayIntersector, ViewerId, Viewpoint};

/// Portals sit this far in front of their wall to avoid z-fighting.
pub const PORTAL_SURFACE_OFFSET: f64 = 1e-4;
/// Distance from a portal's centre to each of its corners.
pub const PORTAL_RADIUS: f64 = 0.75;

/// How a rendered vista reaches the seen portal's texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    /// Render into an off-screen target bound to the texture.
    Framebuffer,
    /// Render into the back buffer, then copy the pixels into the texture.
    BackbufferCopy,
}

/// Field of view (degrees) for a vista seen from `distance` away.
///
/// 180° at the surface, narrowing towards 0° with distance.
#[inline]
pub fn synthetic_fov(distance: f64) -> f64 {
    180.0 / (1.0 + distance)
}

/// Portal standing on a wall struck at `point` with outward `normal`.
///
/// `up` lies in the wall plane, derived from the wall and the shooter's
/// sideways axis rather than the shooter's roll.
pub fn portal_on_wall(point: DVec3, normal: DVec3, shooter: &Actor) -> Actor {
    let side = shooter.direction.cross(shooter.up);
    let up = -normal.cross(side).normalize_or_zero();
    Actor::new(point + normal * PORTAL_SURFACE_OFFSET, normal, up)
}

/// The four corners of a portal's square surface with their texture
/// coordinates, made by turning `up` around `direction` in 90° steps.
pub fn portal_corners(portal: &Actor) -> ([DVec3; 4], [DVec2; 4]) {
    let mut corners = [DVec3::ZERO; 4];
    let axis = portal.direction.normalize_or_zero();
    for (e, corner) in corners.iter_mut().enumerate() {
        let angle = -((e as f64) * 90.0 + 45.0).to_radians();
        let arm = if axis == DVec3::ZERO {
            portal.up
        } else {
            DMat3::from_axis_angle(axis, angle) * portal.up
        };
        *corner = portal.position + arm * PORTAL_RADIUS;
    }
    let uvs = [
        DVec2::new(0.0, 1.0),
        DVec2::new(0.0, 0.0),
        DVec2::new(1.0, 0.0),
        DVec2::new(1.0, 1.0),
    ];
    (corners, uvs)
}

/// Exactly two linked portals plus the GPU resources that carry their views.
pub struct PortalSystem {
    portals: [Actor; 2],
    textures: [TextureId; 2],
    framebuffers: Option<[FramebufferId; 2]>,
    target: (usize, usize),
    max_depth: u32,
}

impl PortalSystem {
    /// Allocate both portal textures (and framebuffers, when enabled and
    /// available) sized to the capped portal resolution.
    pub fn new<G: Gpu + ?Sized>(
        gpu: &mut G,
        settings: &Settings,
        portals: [Actor; 2],
    ) -> Result<Self, RenderError> {
        let target = settings.portal_target();
        let (w, h) = target;
        let textures = [gpu.create_texture(w, h), gpu.create_texture(w, h)];
        check(gpu, "PortalSystem::new textures")?;

        let framebuffers = match (settings.use_framebuffer, gpu.supports_framebuffers()) {
            (true, true) => {
                let fbs = textures.map(|t| gpu.create_framebuffer(t));
                check(gpu, "PortalSystem::new framebuffers")?;
                Some(fbs)
            }
            (true, false) => {
                log::warn!("framebuffers unavailable, falling back to back-buffer copies");
                None
            }
            (false, _) => None,
        };

        let system = Self {
            portals,
            textures,
            framebuffers,
            target,
            max_depth: settings.max_portal_depth,
        };
        log::info!(
            "portal capture: {:?} at {}×{}, depth {}",
            system.capture(),
            w,
            h,
            system.max_depth
        );
        Ok(system)
    }

    pub fn capture(&self) -> Capture {
        if self.framebuffers.is_some() {
            Capture::Framebuffer
        } else {
            Capture::BackbufferCopy
        }
    }

    #[inline]
    pub fn portal(&self, slot: PortalSlot) -> &Actor {
        &self.portals[slot.index()]
    }

    #[inline]
    pub fn portals(&self) -> &[Actor; 2] {
        &self.portals
    }

    #[inline]
    pub fn texture(&self, slot: PortalSlot) -> TextureId {
        self.textures[slot.index()]
    }

    /// Size of each portal's off-screen image.
    #[inline]
    pub fn target_size(&self) -> (usize, usize) {
        self.target
    }

    /// Move portal `slot` onto whatever wall `shooter` is looking at.
    ///
    /// Returns the hit, or `None` (portal untouched) when the ray escapes.
    pub fn fire_portal<L: RayIntersector + ?Sized>(
        &mut self,
        slot: PortalSlot,
        shooter: &Actor,
        level: &L,
    ) -> Option<Hit> {
        let Some(hit) = level.cast(shooter.position, shooter.direction) else {
            log::debug!("portal {slot:?}: ray hit nothing");
            return None;
        };
        let normal = level.normal(hit.wall)?;
        let portal = portal_on_wall(hit.point, normal, shooter);
        log::debug!(
            "portal {slot:?} placed on wall {} at {}",
            hit.wall,
            portal.position
        );
        self.portals[slot.index()] = portal;
        Some(hit)
    }

    /// Refresh both portal textures, then render the player's own view
    /// at `fov` into the full `window`.
    pub fn render_frame<G, V, F>(
        &self,
        gpu: &mut G,
        player: &V,
        fov: f64,
        window: (usize, usize),
        draw_world: &mut F,
    ) -> Result<(), RenderError>
    where
        G: Gpu + ?Sized,
        V: Viewpoint + ?Sized,
        F: FnMut(&mut G, ViewerId),
    {
        let (tw, th) = self.target;
        gpu.viewport(0, 0, tw, th);

        for _ in 0..self.max_depth {
            for seen in PortalSlot::ALL {
                self.render_vista(gpu, player, seen, draw_world)?;
            }
        }

        if self.framebuffers.is_some() {
            gpu.bind_framebuffer(None);
        }
        let (w, h) = window;
        gpu.viewport(0, 0, w, h);

        let aspect = w as f64 / h.max(1) as f64;
        render_view(gpu, player, ViewerId::Player, fov, aspect, NEAR_PLANE, draw_world)
    }

    /// One pass: draw the vista for `seen` and capture it into its texture.
    fn render_vista<G, V, F>(
        &self,
        gpu: &mut G,
        player: &V,
        seen: PortalSlot,
        draw_world: &mut F,
    ) -> Result<(), RenderError>
    where
        G: Gpu + ?Sized,
        V: Viewpoint + ?Sized,
        F: FnMut(&mut G, ViewerId),
    {
        let vista = seen.other();
        let distance = self.portal(seen).position.distance(player.eye());
        let fov = synthetic_fov(distance);
        let camera = *self.portal(vista);
        let texture = self.textures[seen.index()];

        match self.framebuffers {
            Some(fbs) => {
                gpu.bind_framebuffer(Some(fbs[seen.index()]));
                render_view(gpu, &camera, ViewerId::Portal(vista), fov, 1.0, NEAR_PLANE, draw_world)?;
                gpu.bind_texture(Some(texture));
                gpu.generate_mipmaps();
                check(gpu, "portal framebuffer capture")
            }
            None => {
                let (tw, th) = self.target;
                {
                    let mut back = BackBuffer::enter(gpu);
                    render_view(
                        &mut *back,
                        &camera,
                        ViewerId::Portal(vista),
                        fov,
                        1.0,
                        NEAR_PLANE,
                        draw_world,
                    )?;
                    back.bind_texture(Some(texture));
                    back.copy_to_texture(tw, th);
                    back.generate_mipmaps();
                }
                check(gpu, "portal back-buffer capture")
            }
        }
    }
}

/// Exclusive use of the window's back buffer for one portal pass.
///
/// Saves the draw/read buffer state on entry and restores it on drop, on
/// every exit path, so the next pass finds the state it expects.
struct BackBuffer<'a, G: Gpu + ?Sized> {
    gpu: &'a mut G,
}

impl<'a, G: Gpu + ?Sized> BackBuffer<'a, G> {
    fn enter(gpu: &'a mut G) -> Self {
        gpu.push_attrib(AttribMask::COLOR_BUFFER | AttribMask::PIXEL_MODE);
        gpu.draw_buffer(ColorBuffer::Back);
        gpu.read_buffer(ColorBuffer::Back);
        Self { gpu }
    }
}

impl<G: Gpu + ?Sized> Deref for BackBuffer<'_, G> {
    type Target = G;
    fn deref(&self) -> &G {
        self.gpu
    }
}

impl<G: Gpu + ?Sized> DerefMut for BackBuffer<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.gpu
    }
}

impl<G: Gpu + ?Sized> Drop for BackBuffer<'_, G> {
    fn drop(&mut self) {
        self.gpu.pop_attrib();
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::GlError;
    use crate::renderer::testing::{Call, RecordingGpu};
    use crate::world::{Level, Wall, demo_room};

    fn settings(use_framebuffer: bool) -> Settings {
        Settings {
            use_framebuffer,
            width: 640,
            height: 360,
            ..Settings::default()
        }
    }

    fn facing_portals() -> [Actor; 2] {
        [
            Actor::new(DVec3::new(0.0, 2.0, 4.0), DVec3::X, DVec3::Y),
            Actor::new(DVec3::new(5.0, 2.0, 0.0), DVec3::Z, DVec3::Y),
        ]
    }

    fn player_at(p: DVec3) -> Actor {
        Actor::new(p, -DVec3::X, DVec3::Y)
    }

    #[test]
    fn synthetic_fov_is_monotone() {
        assert_eq!(synthetic_fov(0.0), 180.0);
        let mut last = synthetic_fov(0.0);
        for i in 1..1000 {
            let fov = synthetic_fov(i as f64 * 0.37);
            assert!(fov < last);
            assert!(fov > 0.0);
            last = fov;
        }
        assert!(synthetic_fov(1e12) < 1e-9);
    }

    #[test]
    fn fire_portal_lands_on_struck_wall() {
        let room = demo_room();
        let mut gpu = RecordingGpu::default();
        let mut portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();

        let shooter = player_at(DVec3::new(5.0, 2.0, 5.0));
        let hit = portals.fire_portal(PortalSlot::First, &shooter, room).unwrap();
        let p = portals.portal(PortalSlot::First);

        assert_eq!(p.direction, DVec3::X); // west wall normal
        assert!((hit.point - DVec3::new(0.0, 2.0, 5.0)).length() < 1e-12);
        assert!((p.position - (hit.point + DVec3::X * PORTAL_SURFACE_OFFSET)).length() < 1e-12);
        assert!((p.position - hit.point).length() <= PORTAL_SURFACE_OFFSET + 1e-12);
        // up lies in the wall plane
        assert!(p.up.dot(p.direction).abs() < 1e-12);
        assert!((p.up.length() - 1.0).abs() < 1e-12);
        // the other slot is untouched
        assert_eq!(portals.portal(PortalSlot::Second), &facing_portals()[1]);
    }

    #[test]
    fn fire_portal_miss_leaves_portal_alone() {
        let empty = Level::default();
        let mut gpu = RecordingGpu::default();
        let mut portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        let before = *portals.portal(PortalSlot::Second);
        assert!(portals.fire_portal(PortalSlot::Second, &player_at(DVec3::ONE), &empty).is_none());
        assert_eq!(portals.portal(PortalSlot::Second), &before);
    }

    #[test]
    fn portal_up_ignores_shooter_roll() {
        let wall = Wall::span(DVec3::new(-5.0, -5.0, 3.0), DVec3::X * 10.0, DVec3::Y * 10.0, -DVec3::Z);
        let level = Level::new(vec![wall]);
        let mut gpu = RecordingGpu::default();
        let mut portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();

        let upright = Actor::new(DVec3::ZERO, DVec3::Z, DVec3::Y);
        let tilted = Actor::new(DVec3::ZERO, DVec3::Z, DVec3::new(0.0, 1.0, -0.5).normalize());
        portals.fire_portal(PortalSlot::First, &upright, &level).unwrap();
        let a = portals.portal(PortalSlot::First).up;
        portals.fire_portal(PortalSlot::First, &tilted, &level).unwrap();
        let b = portals.portal(PortalSlot::First).up;
        assert!((a - b).length() < 1e-12);
    }

    #[test]
    fn target_is_capped() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        assert_eq!(portals.target_size(), (128, 128));
        assert_eq!(
            gpu.calls,
            vec![Call::CreateTexture { w: 128, h: 128 }, Call::CreateTexture { w: 128, h: 128 }]
        );

        let small = Settings {
            width: 100,
            height: 60,
            ..Settings::default()
        };
        let portals = PortalSystem::new(&mut gpu, &small, facing_portals()).unwrap();
        assert_eq!(portals.target_size(), (100, 60));
    }

    #[test]
    fn framebuffer_requested_but_missing_degrades() {
        let mut gpu = RecordingGpu::without_framebuffers();
        let portals = PortalSystem::new(&mut gpu, &settings(true), facing_portals()).unwrap();
        assert_eq!(portals.capture(), Capture::BackbufferCopy);

        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(true), facing_portals()).unwrap();
        assert_eq!(portals.capture(), Capture::Framebuffer);
        assert_eq!(gpu.calls[2], Call::CreateFramebuffer(portals.texture(PortalSlot::First)));
        assert_eq!(gpu.calls[3], Call::CreateFramebuffer(portals.texture(PortalSlot::Second)));
    }

    #[test]
    fn backbuffer_path_saves_and_restores_around_each_pass() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        gpu.calls.clear();

        let player = player_at(DVec3::new(3.0, 2.0, 4.0));
        let mut viewers = Vec::new();
        portals
            .render_frame(&mut gpu, &player, 90.0, (640, 360), &mut |_, v| viewers.push(v))
            .unwrap();

        assert_eq!(
            viewers,
            vec![
                ViewerId::Portal(PortalSlot::Second),
                ViewerId::Portal(PortalSlot::First),
                ViewerId::Player,
            ]
        );

        let pushes = gpu.calls.iter().filter(|c| matches!(c, Call::PushAttrib(_))).count();
        let pops = gpu.calls.iter().filter(|c| **c == Call::PopAttrib).count();
        assert_eq!((pushes, pops), (2, 2));
        assert_eq!(gpu.draw, ColorBuffer::Front);
        assert_eq!(gpu.read, ColorBuffer::Front);

        // first pass: seen = First, rendered from Second, copied into First's texture
        let first = &gpu.calls[..];
        let copy = first
            .iter()
            .position(|c| *c == Call::CopyToTexture { w: 128, h: 128 })
            .unwrap();
        assert_eq!(first[copy - 1], Call::BindTexture(Some(portals.texture(PortalSlot::First))));
        assert_eq!(first[copy + 1], Call::GenerateMipmaps);
        assert_eq!(first[copy + 2], Call::PopAttrib);
        assert!(!gpu.calls.iter().any(|c| matches!(c, Call::BindFramebuffer(_))));

        // the player's view closes the frame at full size and true fov
        let n = gpu.calls.len();
        assert_eq!(gpu.calls[n - 5], Call::Viewport { w: 640, h: 360 });
        assert_eq!(gpu.calls[n - 4], Call::Projection { fov: 90.0, aspect: 640.0 / 360.0 });
    }

    #[test]
    fn vista_fov_depends_on_distance_to_seen_portal() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        gpu.calls.clear();

        let player = player_at(DVec3::new(3.0, 2.0, 4.0)); // 3 from First, ~5 from Second
        portals
            .render_frame(&mut gpu, &player, 90.0, (640, 360), &mut |_, _| {})
            .unwrap();

        let fovs: Vec<(f64, f64)> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Projection { fov, aspect } => Some((*fov, *aspect)),
                _ => None,
            })
            .collect();
        let d_second = DVec3::new(5.0, 2.0, 0.0).distance(DVec3::new(3.0, 2.0, 4.0));
        assert_eq!(fovs[0], (synthetic_fov(3.0), 1.0));
        assert_eq!(fovs[1], (synthetic_fov(d_second), 1.0));
        assert_eq!(fovs.len(), 3);
    }

    #[test]
    fn vista_camera_is_the_other_portal() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        gpu.calls.clear();
        portals
            .render_frame(&mut gpu, &player_at(DVec3::ONE), 90.0, (640, 360), &mut |_, _| {})
            .unwrap();

        let eyes: Vec<DVec3> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::LookAt { eye, .. } => Some(*eye),
                _ => None,
            })
            .collect();
        assert_eq!(eyes[0], facing_portals()[1].position);
        assert_eq!(eyes[1], facing_portals()[0].position);
        assert_eq!(eyes[2], DVec3::ONE);
    }

    #[test]
    fn framebuffer_path_binds_targets_then_restores_default() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(true), facing_portals()).unwrap();
        gpu.calls.clear();
        portals
            .render_frame(&mut gpu, &player_at(DVec3::ONE), 90.0, (640, 360), &mut |_, _| {})
            .unwrap();

        let binds: Vec<Option<FramebufferId>> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::BindFramebuffer(fb) => Some(*fb),
                _ => None,
            })
            .collect();
        assert_eq!(binds.len(), 3);
        assert!(binds[0].is_some() && binds[1].is_some() && binds[0] != binds[1]);
        assert_eq!(binds[2], None);
        assert!(!gpu.calls.iter().any(|c| matches!(c, Call::PushAttrib(_) | Call::CopyToTexture { .. })));
        assert_eq!(gpu.calls.iter().filter(|c| **c == Call::GenerateMipmaps).count(), 2);
    }

    #[test]
    fn failure_inside_backbuffer_pass_still_restores_state() {
        let mut gpu = RecordingGpu::default();
        let portals = PortalSystem::new(&mut gpu, &settings(false), facing_portals()).unwrap();
        gpu.calls.clear();

        let err = portals
            .render_frame(&mut gpu, &player_at(DVec3::ONE), 90.0, (640, 360), &mut |g, _| {
                g.inject(GlError::InvalidValue)
            })
            .unwrap_err();

        assert_eq!(err.location, "render_view draw world");
        assert_eq!(gpu.calls.last(), Some(&Call::PopAttrib));
        assert_eq!(gpu.draw, ColorBuffer::Front);
        assert_eq!(gpu.read, ColorBuffer::Front);
        // aborted during the first pass; the player view never ran
        assert_eq!(gpu.calls.iter().filter(|c| matches!(c, Call::Projection { .. })).count(), 1);
    }

    #[test]
    fn corners_surround_the_portal() {
        let p = Actor::new(DVec3::new(1.0, 2.0, 3.0), DVec3::X, DVec3::Y);
        let (corners, _) = portal_corners(&p);
        for c in corners {
            assert!(((c - p.position).length() - PORTAL_RADIUS).abs() < 1e-12);
            assert!((c - p.position).dot(p.direction).abs() < 1e-12);
        }
        let centre = corners.iter().copied().sum::<DVec3>() / 4.0;
        assert!((centre - p.position).length() < 1e-12);
    }
}
