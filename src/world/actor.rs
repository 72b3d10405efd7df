use glam::DVec3;

/// Minimal viewer entity in world space.
///
/// * `direction` and `up` are applied as given (look-at style); nothing
///   keeps them orthonormal, near-parallel values only degrade the image.
/// * Portals are plain `Actor`s: `direction` is the outward wall normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Actor {
    pub position: DVec3, // eye location
    pub direction: DVec3,
    pub up: DVec3,
}

impl Default for Actor {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            direction: DVec3::ZERO,
            up: DVec3::Y,
        }
    }
}

impl Actor {
    pub fn new(position: DVec3, direction: DVec3, up: DVec3) -> Self {
        Self {
            position,
            direction,
            up,
        }
    }
}

/// Anything the render contract can look through.
pub trait Viewpoint {
    fn eye(&self) -> DVec3;
    fn direction(&self) -> DVec3;
    fn up(&self) -> DVec3;

    /// Point the view is aimed at (`eye + direction`).
    #[inline]
    fn target(&self) -> DVec3 {
        self.eye() + self.direction()
    }
}

impl Viewpoint for Actor {
    #[inline]
    fn eye(&self) -> DVec3 {
        self.position
    }
    #[inline]
    fn direction(&self) -> DVec3 {
        self.direction
    }
    #[inline]
    fn up(&self) -> DVec3 {
        self.up
    }
}

/// One of the two linked portal slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortalSlot {
    First,
    Second,
}

impl PortalSlot {
    /// Render order of the per-frame portal passes.
    pub const ALL: [PortalSlot; 2] = [PortalSlot::First, PortalSlot::Second];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            PortalSlot::First => 0,
            PortalSlot::Second => 1,
        }
    }

    /// The paired slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            PortalSlot::First => PortalSlot::Second,
            PortalSlot::Second => PortalSlot::First,
        }
    }
}

/// Who a frame is being drawn for.  Draw callbacks use it to skip the
/// viewer's own body (the player avatar, or the portal used as camera).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewerId {
    Player,
    Portal(PortalSlot),
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_actor_is_upright() {
        let a = Actor::default();
        assert_eq!(a.up, DVec3::Y);
        assert_eq!(a.direction, DVec3::ZERO);
    }

    #[test]
    fn target_is_eye_plus_direction() {
        let a = Actor::new(DVec3::new(1.0, 2.0, 3.0), DVec3::X, DVec3::Y);
        assert_eq!(a.target(), DVec3::new(2.0, 2.0, 3.0));
    }

    #[test]
    fn slots_pair_with_each_other() {
        for slot in PortalSlot::ALL {
            assert_ne!(slot, slot.other());
            assert_eq!(slot, slot.other().other());
            assert_eq!(slot.index() + slot.other().index(), 1);
        }
    }
}
