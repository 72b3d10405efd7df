use glam::DVec3;
use once_cell::sync::Lazy;

pub type WallId = usize;

/// One planar wall quad.
///
/// Corner order: `corners[1] - corners[0]` runs along the texture's
/// height, `corners[3] - corners[0]` along its width.  `normal` faces
/// into the playable space.
#[derive(Clone, Debug, PartialEq)]
pub struct Wall {
    pub corners: [DVec3; 4],
    pub normal: DVec3,
}

impl Wall {
    pub fn new(corners: [DVec3; 4], normal: DVec3) -> Self {
        Self { corners, normal }
    }

    /// Quad spanned from `origin` by `width` and `height`.
    pub fn span(origin: DVec3, width: DVec3, height: DVec3, normal: DVec3) -> Self {
        Self::new(
            [origin, origin + height, origin + width + height, origin + width],
            normal,
        )
    }

    /// Texture repeat counts across the surface: (width, height).
    pub fn extent(&self) -> (f64, f64) {
        let w = (self.corners[3] - self.corners[0]).length();
        let h = (self.corners[1] - self.corners[0]).length();
        (w, h)
    }

    /// Closest point to `p` on the quad after every corner has been
    /// multiplied component-wise by `scale`.
    ///
    /// The collision solver works in unit-sphere space, where the wall
    /// is the same quad stretched by the inverse ellipsoid radii.
    pub fn closest_point_scaled(&self, p: DVec3, scale: DVec3) -> DVec3 {
        let c = self.corners.map(|v| v * scale);
        let n = (c[1] - c[0]).cross(c[3] - c[0]).normalize_or_zero();
        if n == DVec3::ZERO {
            return closest_on_segment(p, c[0], c[2]);
        }

        let on_plane = p - n * (p - c[0]).dot(n);
        if inside_convex(&c, n, on_plane) {
            return on_plane;
        }

        (0..4)
            .map(|i| closest_on_segment(p, c[i], c[(i + 1) % 4]))
            .min_by(|a, b| a.distance_squared(p).total_cmp(&b.distance_squared(p)))
            .unwrap_or(on_plane)
    }

    /// `true` if `p` (assumed on the wall's plane) lies within the quad.
    pub fn contains(&self, p: DVec3) -> bool {
        inside_convex(&self.corners, self.normal, p)
    }
}

fn inside_convex(c: &[DVec3; 4], n: DVec3, p: DVec3) -> bool {
    const EPS: f64 = 1e-9;
    let mut pos = false;
    let mut neg = false;
    for i in 0..4 {
        let side = (c[(i + 1) % 4] - c[i]).cross(p - c[i]).dot(n);
        pos |= side > EPS;
        neg |= side < -EPS;
    }
    !(pos && neg)
}

fn closest_on_segment(p: DVec3, a: DVec3, b: DVec3) -> DVec3 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Static level: an ordered list of wall quads, indexed `0..len()`.
#[derive(Clone, Debug, Default)]
pub struct Level {
    walls: Vec<Wall>,
}

impl Level {
    pub fn new(walls: Vec<Wall>) -> Self {
        Self { walls }
    }

    #[inline]
    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    #[inline]
    pub fn wall(&self, id: WallId) -> Option<&Wall> {
        self.walls.get(id)
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }
}

/*──────────────────────── built-in room ────────────────────────*/

pub const ROOM_SIZE: f64 = 10.0;
pub const ROOM_HEIGHT: f64 = 5.0;

static DEMO_ROOM: Lazy<Level> = Lazy::new(build_demo_room);

/// A closed 10×5×10 box with a low block standing on the floor.
pub fn demo_room() -> &'static Level {
    &DEMO_ROOM
}

fn build_demo_room() -> Level {
    let (s, h) = (ROOM_SIZE, ROOM_HEIGHT);
    let x = DVec3::X * s;
    let z = DVec3::Z * s;
    let y = DVec3::Y * h;

    let mut walls = vec![
        Wall::span(DVec3::ZERO, x, z, DVec3::Y),            // floor
        Wall::span(DVec3::new(0.0, h, 0.0), x, z, -DVec3::Y), // ceiling
        Wall::span(DVec3::ZERO, z, y, DVec3::X),            // west
        Wall::span(DVec3::new(s, 0.0, 0.0), z, y, -DVec3::X), // east
        Wall::span(DVec3::ZERO, x, y, DVec3::Z),            // north
        Wall::span(DVec3::new(0.0, 0.0, s), x, y, -DVec3::Z), // south
    ];

    // block: x 6‥8, z 2‥4, 0.5 tall
    let (bx, bz, bh) = (6.0, 2.0, 0.5);
    let w = DVec3::X * 2.0;
    let d = DVec3::Z * 2.0;
    let up = DVec3::Y * bh;
    walls.extend([
        Wall::span(DVec3::new(bx, bh, bz), w, d, DVec3::Y),
        Wall::span(DVec3::new(bx, 0.0, bz), d, up, -DVec3::X),
        Wall::span(DVec3::new(bx + 2.0, 0.0, bz), d, up, DVec3::X),
        Wall::span(DVec3::new(bx, 0.0, bz), w, up, -DVec3::Z),
        Wall::span(DVec3::new(bx, 0.0, bz + 2.0), w, up, DVec3::Z),
    ]);

    Level::new(walls)
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
