mod actor;
mod geometry;
mod ray;

pub use actor::{Actor, PortalSlot, ViewerId, Viewpoint};

pub use geometry::{Level, ROOM_HEIGHT, ROOM_SIZE, Wall, WallId, demo_room};

pub use ray::{Hit, RayIntersector};
