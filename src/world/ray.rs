use glam::DVec3;

use super::{Level, WallId};

/// Nearest wall struck by a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub wall: WallId,
    pub point: DVec3,
    pub distance: f64, // in units of `direction`'s length
}

/// Nearest-hit query against static geometry.
pub trait RayIntersector {
    /// Returns `None` when the ray leaves the level without touching a wall.
    fn cast(&self, origin: DVec3, direction: DVec3) -> Option<Hit>;

    /// The wall's outward normal, if `wall` exists.
    fn normal(&self, wall: WallId) -> Option<DVec3>;
}

impl RayIntersector for Level {
    fn cast(&self, origin: DVec3, direction: DVec3) -> Option<Hit> {
        const PARALLEL_EPS: f64 = 1e-12;
        const MIN_T: f64 = 1e-9;

        let mut best: Option<Hit> = None;
        for (id, wall) in self.walls().iter().enumerate() {
            let denom = direction.dot(wall.normal);
            if denom.abs() < PARALLEL_EPS {
                continue;
            }
            let t = (wall.corners[0] - origin).dot(wall.normal) / denom;
            if t <= MIN_T || best.is_some_and(|b| b.distance <= t) {
                continue;
            }
            let point = origin + direction * t;
            if wall.contains(point) {
                best = Some(Hit {
                    wall: id,
                    point,
                    distance: t,
                });
            }
        }
        best
    }

    fn normal(&self, wall: WallId) -> Option<DVec3> {
        self.wall(wall).map(|w| w.normal)
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
