//! Physically simulated ellipsoid body driven by push / jump / aim signals.

use glam::{DMat3, DVec3, EulerRot};
use rand::Rng;

use super::CollisionSolver;
use crate::world::{Actor, Viewpoint};

/* ----------------------------------------------------------------- */
/*  Per-frame physics constants                                      */
/* ----------------------------------------------------------------- */
pub const GRAVITY: f64 = -0.011;
pub const TERMINAL_VELOCITY: f64 = -2.0;
pub const JUMP_IMPULSE: f64 = 0.18;
pub const MAX_WALK_SPEED: f64 = 0.1;
const ACCELERATION: f64 = 0.2;
const DECELERATION: f64 = 0.1;
/// Squared speed below which a body is considered at rest.
pub const REST_THRESHOLD: f64 = 1e-9;
/// Visual lean (degrees) per unit of vertical speed.
const LEAN_FACTOR: f64 = 35.0;
const PITCH_LIMIT: f64 = 90.0;

/* idle "breathing" of secondary bodies */
pub const FATNESS_MIN: f64 = 0.4;
pub const FATNESS_MAX: f64 = 1.0;
const FLUCTUATION_STEP: f64 = 0.3;
const FLUCTUATION_LIMIT: f64 = 0.5;
const FLUCTUATION_RESET: f64 = 0.3;

/// Horizontal drive state.  A push lasts one frame, then decays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pushing {
    #[default]
    Idle,
    Accelerating,
    Decelerating,
}

/// Fire-and-forget input for a [`BlobActor`]; realised by the next `update`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Signal {
    /// Walk towards `angle` degrees relative to the look direction.
    Push { angle: f64 },
    /// Ignored unless the body is on the ground.
    Jump,
    /// Turn by `yaw` and tilt by `pitch` degrees (both subtracted).
    Aim { yaw: f64, pitch: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlobActor {
    pub actor: Actor,

    pub look_angle: f64, // degrees around world-up, unbounded
    pub yaw: f64,        // degrees of tilt, visual only, [-90, 90]

    pub fatness: DVec3, // ellipsoid radii
    pub center: DVec3,  // offset from the ellipsoid centre up to `position`
    pub fluctuation: DVec3,

    pub moving: bool,
    pub ground: bool,
    pub move_angle: f64, // degrees, relative to `look_angle`
    pub velocity: DVec3,
    pub pushing: Pushing,
}

impl Default for BlobActor {
    fn default() -> Self {
        Self {
            actor: Actor::default(),
            look_angle: 0.0,
            yaw: 0.0,
            fatness: DVec3::ONE,
            center: DVec3::ZERO,
            fluctuation: DVec3::ZERO,
            moving: true,
            ground: false,
            move_angle: 0.0,
            velocity: DVec3::ZERO,
            pushing: Pushing::Idle,
        }
    }
}

impl BlobActor {
    /// The first-person body: a tall, narrow ellipsoid with the eye
    /// above its centre, standing in the demo room.
    pub fn player() -> Self {
        let mut player = Self {
            actor: Actor::new(DVec3::new(4.0, 3.0, 7.25), DVec3::X, DVec3::Y),
            look_angle: 170.0,
            yaw: 10.0,
            fatness: DVec3::new(0.2, 0.6, 0.2),
            center: DVec3::new(0.0, 0.3, 0.0),
            ..Self::default()
        };
        player.orient();
        player
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.actor.position
    }

    pub fn movement_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Push { angle } => {
                self.pushing = Pushing::Accelerating;
                self.move_angle = angle;
            }
            Signal::Jump => {
                if self.ground {
                    self.moving = true;
                    self.velocity.y += JUMP_IMPULSE;
                }
            }
            Signal::Aim { yaw, pitch } => {
                self.look_angle -= yaw;
                self.yaw = (self.yaw - pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            }
        }
    }

    /// Advance one simulation tick.
    ///
    /// Collision runs in two independent sweeps, horizontal then vertical,
    /// so that `ground` reflects only whether the downward move was blocked.
    pub fn update<S: CollisionSolver + ?Sized>(&mut self, solver: &S) {
        self.ground = true;

        if self.pushing != Pushing::Idle {
            let (max_speed, accel) = match self.pushing {
                Pushing::Accelerating => (MAX_WALK_SPEED, ACCELERATION),
                _ => (0.0, DECELERATION),
            };
            let desired = heading(self.look_angle + self.move_angle);
            // horizontal only; vertical belongs to gravity
            self.velocity.x = self.velocity.x * (1.0 - accel) + desired.x * (accel * max_speed);
            self.velocity.z = self.velocity.z * (1.0 - accel) + desired.z * (accel * max_speed);
            self.moving = true;
        }

        if self.moving {
            self.ground = false;
            let mut y_vel = (self.velocity.y + GRAVITY).max(TERMINAL_VELOCITY);
            self.velocity.y = 0.0;

            let mut centre = self.actor.position - self.center;
            solver.sweep(&mut centre, self.velocity, self.fatness);
            if solver.sweep(&mut centre, DVec3::new(0.0, y_vel, 0.0), self.fatness) {
                if y_vel < 0.0 {
                    self.ground = true;
                }
                y_vel = 0.0;
            }
            self.velocity.y = y_vel;
            self.actor.position = centre + self.center;

            if self.velocity.length_squared() < REST_THRESHOLD {
                self.velocity = DVec3::ZERO;
                self.pushing = Pushing::Idle;
                if self.ground {
                    self.moving = false;
                }
            }
        }

        if self.pushing != Pushing::Idle {
            self.pushing = Pushing::Decelerating;
        }

        self.orient();
    }

    /// Rebuild `direction`/`up` from the look angles plus a lean
    /// proportional to vertical speed.
    fn orient(&mut self) {
        let lean = self.yaw + self.velocity.y * LEAN_FACTOR;
        let rot = DMat3::from_euler(
            EulerRot::YZX,
            self.look_angle.to_radians(),
            lean.to_radians(),
            0.0,
        );
        self.actor.direction = rot * DVec3::X;
        self.actor.up = rot * DVec3::Y;
    }

    /// Random-walk the ellipsoid radii while keeping `fatness.length()`.
    ///
    /// Every radius ends inside `[FATNESS_MIN, FATNESS_MAX]` provided the
    /// body started inside that box.
    pub fn fluctuate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let size = self.fatness.length();
        self.fatness += self.fluctuation;

        for c in 0..3 {
            self.fluctuation[c] += (rng.r#gen::<f64>() - 0.5) * 2.0 * FLUCTUATION_STEP;
            if self.fluctuation[c] < -FLUCTUATION_LIMIT {
                self.fluctuation[c] = -FLUCTUATION_RESET;
            }
            if self.fluctuation[c] > FLUCTUATION_LIMIT {
                self.fluctuation[c] = FLUCTUATION_RESET;
            }
        }

        self.fatness = rescale_within(self.fatness, size);
    }
}

impl Viewpoint for BlobActor {
    #[inline]
    fn eye(&self) -> DVec3 {
        self.actor.position
    }
    #[inline]
    fn direction(&self) -> DVec3 {
        self.actor.direction
    }
    #[inline]
    fn up(&self) -> DVec3 {
        self.actor.up
    }
}

/// Unit vector on the horizontal plane, `degrees` around world-up from +X.
pub fn heading(degrees: f64) -> DVec3 {
    DMat3::from_rotation_y(degrees.to_radians()) * DVec3::X
}

/// Clamp `v` into the fatness box, then rescale the radii that are not
/// pinned at a bound until the vector has `length` again.
///
/// Not a uniform rescale: radii pinned at a bound stay there, and only the
/// free ones absorb the length change, so every radius remains in the box.
fn rescale_within(v: DVec3, length: f64) -> DVec3 {
    let mut v = v.clamp(DVec3::splat(FATNESS_MIN), DVec3::splat(FATNESS_MAX));
    let target2 = length * length;

    // each pass pins at least one more axis, so three passes suffice
    for _ in 0..3 {
        let len2 = v.length_squared();
        if (len2 - target2).abs() <= 1e-12 * target2.max(1.0) {
            break;
        }
        let growing = len2 < target2;
        let mut pinned2 = 0.0;
        let mut free2 = 0.0;
        for c in 0..3 {
            let at_bound = if growing {
                v[c] >= FATNESS_MAX
            } else {
                v[c] <= FATNESS_MIN
            };
            if at_bound {
                pinned2 += v[c] * v[c];
            } else {
                free2 += v[c] * v[c];
            }
        }
        if free2 <= 0.0 || target2 <= pinned2 {
            break;
        }
        let s = ((target2 - pinned2) / free2).sqrt();
        for c in 0..3 {
            let at_bound = if growing {
                v[c] >= FATNESS_MAX
            } else {
                v[c] <= FATNESS_MIN
            };
            if !at_bound {
                v[c] *= s;
            }
        }
        v = v.clamp(DVec3::splat(FATNESS_MIN), DVec3::splat(FATNESS_MAX));
    }
    v
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
