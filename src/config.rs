//! Run-time settings shared by the binary and the portal renderer.

/// Narrowest and widest player field of view, in degrees.
pub const FOV_MIN: f64 = 65.0;
pub const FOV_MAX: f64 = 110.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Vertical field of view of the player camera (degrees).
    pub fov: f64,
    /// Degrees of aim per pixel of mouse travel.
    pub mouse_sensitivity: f64,
    /// Prefer off-screen framebuffers for portal capture.
    pub use_framebuffer: bool,
    pub width: usize,
    pub height: usize,
    /// Upper bound on each side of a portal's off-screen image.
    pub portal_resolution_cap: usize,
    pub max_portal_depth: u32,
    pub capture_mouse: bool,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fov: 90.0,
            mouse_sensitivity: 0.35,
            use_framebuffer: false,
            width: 1024,
            height: 576,
            portal_resolution_cap: 128,
            max_portal_depth: 1,
            capture_mouse: true,
            verbose: false,
        }
    }
}

impl Settings {
    /// Change the field of view by `delta`, staying within
    /// [`FOV_MIN`]..=[`FOV_MAX`].  Returns the new value.
    pub fn adjust_fov(&mut self, delta: f64) -> f64 {
        self.fov = clamp_fov(self.fov + delta);
        self.fov
    }

    /// Size of each portal's off-screen target.
    pub fn portal_target(&self) -> (usize, usize) {
        (
            self.width.min(self.portal_resolution_cap),
            self.height.min(self.portal_resolution_cap),
        )
    }

    /// Aim angles (yaw, pitch) for a mouse move of `dx`, `dy` pixels.
    ///
    /// Whole degrees only; sub-degree motion is dropped.
    pub fn aim(&self, dx: f64, dy: f64) -> (f64, f64) {
        (
            (-(dx * self.mouse_sensitivity)).trunc(),
            (-(dy * self.mouse_sensitivity)).trunc(),
        )
    }
}

#[inline]
pub fn clamp_fov(fov: f64) -> f64 {
    fov.clamp(FOV_MIN, FOV_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fov_stays_in_range() {
        let mut s = Settings::default();
        for _ in 0..100 {
            s.adjust_fov(1.0);
        }
        assert_eq!(s.fov, FOV_MAX);
        for _ in 0..100 {
            s.adjust_fov(-1.0);
        }
        assert_eq!(s.fov, FOV_MIN);
        assert_eq!(clamp_fov(200.0), FOV_MAX);
    }

    #[test]
    fn portal_target_is_capped_per_axis() {
        let s = Settings::default();
        assert_eq!(s.portal_target(), (128, 128));
        let s = Settings {
            width: 64,
            height: 300,
            ..Settings::default()
        };
        assert_eq!(s.portal_target(), (64, 128));
    }

    #[test]
    fn aim_truncates_towards_zero() {
        let s = Settings::default();
        assert_eq!(s.aim(10.0, -10.0), (-3.0, 3.0));
        assert_eq!(s.aim(2.0, 0.0), (-0.0, -0.0));
        assert_eq!(s.aim(-2.0, 0.0).0, 0.0);
    }
}
