use glam::DVec3;
use rand::{SeedableRng, rngs::StdRng};

use super::{BlobActor, Body, CollisionSolver};
use crate::world::Actor;

/// Radii of a freshly spawned blob.
const BLOB_FATNESS: f64 = 0.45;
/// How far in front of the player a blob appears.
const BLOB_SPAWN_OFFSET: f64 = 0.2;
/// Launch speed along the player's view direction.
const BLOB_LAUNCH_SPEED: f64 = 0.2;

/// Owns every simulated body and steps them once per frame.
pub struct TicRunner {
    pub player: BlobActor,
    bodies: Vec<Body>,
    rng: StdRng,
    tic: u64,
}

impl TicRunner {
    pub fn new(player: BlobActor) -> Self {
        Self::with_rng(player, StdRng::from_entropy())
    }

    /// Deterministic variant for tests and replays.
    pub fn with_rng(player: BlobActor, rng: StdRng) -> Self {
        Self {
            player,
            bodies: Vec::new(),
            rng,
            tic: 0,
        }
    }

    #[inline]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    #[inline]
    pub fn tic(&self) -> u64 {
        self.tic
    }

    pub fn spawn(&mut self, body: Body) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    /// Throw a small blob out of the player's eye.
    pub fn spawn_blob(&mut self) -> usize {
        let p = &self.player;
        let blob = BlobActor {
            actor: Actor::new(
                p.actor.position + p.actor.direction * BLOB_SPAWN_OFFSET,
                p.actor.direction,
                DVec3::Y,
            ),
            fatness: DVec3::splat(BLOB_FATNESS),
            velocity: p.actor.direction * BLOB_LAUNCH_SPEED + p.velocity,
            ..BlobActor::default()
        };
        let id = self.spawn(Body::Blob(blob));
        log::debug!("spawned blob #{id} at {}", self.bodies[id].actor().position);
        id
    }

    /// Run one fixed-order game tic: the player first, then every body.
    pub fn tick<S: CollisionSolver + ?Sized>(&mut self, solver: &S) {
        self.player.update(solver);
        for body in &mut self.bodies {
            body.update(solver);
            if let Some(blob) = body.as_blob_mut() {
                blob.fluctuate(&mut self.rng);
            }
        }
        self.tic += 1;
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
