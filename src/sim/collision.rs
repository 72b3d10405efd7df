//! Ellipsoid collide-and-slide against the level's wall quads.
//!
//! The move is cut into fixed slices, at least four and more for long
//! moves.  Each slice runs in *unit-sphere space*: positions are
//! divided by the ellipsoid radii so the body becomes a sphere of radius 1
//! and every wall becomes a correspondingly stretched quad.  A penetrating
//! wall pushes the centre back out along the separation direction and
//! removes the inward component from the slices still to come, so the
//! remaining motion glides along the surface.

use glam::DVec3;

use crate::world::Level;

/// Anything that can move an ellipsoid through static geometry.
pub trait CollisionSolver {
    /// Advance `position` (the ellipsoid centre) by up to `displacement`,
    /// sliding along blocking surfaces.  Returns `true` if anything blocked.
    ///
    /// The solver never touches velocity; callers zero the blocked axis.
    fn sweep(&self, position: &mut DVec3, displacement: DVec3, radii: DVec3) -> bool;
}

impl CollisionSolver for Level {
    #[inline]
    fn sweep(&self, position: &mut DVec3, displacement: DVec3, radii: DVec3) -> bool {
        collide_and_slide(self, position, displacement, radii)
    }
}

const MIN_SLICES: usize = 4;
const MAX_SLICES: usize = 256;
/// Longest slice, in unit-sphere radii.
const MAX_SLICE_LEN: f64 = 0.25;
/// Extra clearance left after a push-out, in unit-sphere radii.
const SKIN: f64 = 1e-6;
const DEGENERATE: f64 = 1e-12;

/// Move an axis-aligned ellipsoid with `radii` from `position` by
/// `displacement`; see the module docs for the method.
pub fn collide_and_slide(
    level: &Level,
    position: &mut DVec3,
    displacement: DVec3,
    radii: DVec3,
) -> bool {
    if displacement == DVec3::ZERO {
        return false;
    }

    let inv = radii.recip();
    let mut centre = *position * inv;
    let full = displacement * inv;

    let slices = ((full.length() / MAX_SLICE_LEN).ceil() as usize).clamp(MIN_SLICES, MAX_SLICES);
    let mut slice = full / slices as f64;
    let mut blocked = false;

    for _ in 0..slices {
        centre += slice;

        for wall in level.walls() {
            let closest = wall.closest_point_scaled(centre, inv);
            let offset = centre - closest;
            let dist = offset.length();
            if dist >= 1.0 {
                continue;
            }

            let push_dir = if dist > DEGENERATE {
                offset / dist
            } else {
                // centre sits on the surface: back out along the stretched normal
                (wall.normal * radii).normalize_or_zero()
            };
            centre += push_dir * (1.0 + SKIN - dist);

            let inward = slice.dot(push_dir);
            if inward < 0.0 {
                slice -= push_dir * inward;
            }
            blocked = true;
        }
    }

    *position = centre * radii;
    blocked
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Wall;

    fn floor() -> Level {
        Level::new(vec![Wall::span(
            DVec3::new(-50.0, 0.0, -50.0),
            DVec3::X * 100.0,
            DVec3::Z * 100.0,
            DVec3::Y,
        )])
    }

    const RADII: DVec3 = DVec3::new(0.2, 0.6, 0.2);

    #[test]
    fn free_motion_is_unblocked_and_exact() {
        let level = floor();
        let mut p = DVec3::new(0.0, 5.0, 0.0);
        let blocked = level.sweep(&mut p, DVec3::new(0.1, -0.2, 0.3), RADII);
        assert!(!blocked);
        assert!((p - DVec3::new(0.1, 4.8, 0.3)).length() < 1e-9);
    }

    #[test]
    fn falling_onto_floor_is_blocked_and_rests_on_surface() {
        let level = floor();
        let mut p = DVec3::new(0.0, 0.65, 0.0);
        let blocked = level.sweep(&mut p, DVec3::new(0.0, -0.2, 0.0), RADII);
        assert!(blocked);
        // bottom of the ellipsoid touches y = 0
        assert!((p.y - RADII.y).abs() < 1e-5, "y = {}", p.y);
    }

    #[test]
    fn resting_body_is_blocked_every_frame() {
        let level = floor();
        let mut p = DVec3::new(0.0, 0.6 + 1e-6, 0.0);
        for _ in 0..10 {
            assert!(level.sweep(&mut p, DVec3::new(0.0, -0.011, 0.0), RADII));
            assert!(p.y >= RADII.y - 1e-9);
        }
    }

    #[test]
    fn horizontal_motion_along_floor_slides_freely() {
        let level = floor();
        let mut p = DVec3::new(0.0, 0.6 * (1.0 + 1e-5), 0.0);
        let blocked = level.sweep(&mut p, DVec3::new(0.1, 0.0, 0.0), RADII);
        assert!(!blocked);
        assert!((p.x - 0.1).abs() < 1e-9);
    }

    #[test]
    fn diagonal_push_into_wall_keeps_tangential_motion() {
        // wall at x = 1 facing -X
        let wall = Wall::span(
            DVec3::new(1.0, -10.0, -10.0),
            DVec3::Z * 20.0,
            DVec3::Y * 20.0,
            -DVec3::X,
        );
        let level = Level::new(vec![wall]);
        let mut p = DVec3::new(0.75, 0.0, 0.0);
        let blocked = level.sweep(&mut p, DVec3::new(0.2, 0.0, 0.2), RADII);
        assert!(blocked);
        assert!(p.x <= 1.0 - RADII.x + 1e-5, "penetrated: x = {}", p.x);
        assert!(p.z > 0.15, "lost tangential motion: z = {}", p.z);
    }

    #[test]
    fn zero_displacement_is_a_no_op() {
        let level = floor();
        let mut p = DVec3::new(0.0, 0.3, 0.0); // overlapping, but not moving
        assert!(!level.sweep(&mut p, DVec3::ZERO, RADII));
        assert_eq!(p, DVec3::new(0.0, 0.3, 0.0));
    }
}
