mod blob;
mod body;
mod collision;
mod tic;

pub use blob::{
    BlobActor, FATNESS_MAX, FATNESS_MIN, GRAVITY, JUMP_IMPULSE, MAX_WALK_SPEED, Pushing,
    REST_THRESHOLD, Signal, TERMINAL_VELOCITY, heading,
};
pub use body::Body;
pub use collision::{CollisionSolver, collide_and_slide};
pub use tic::TicRunner;
