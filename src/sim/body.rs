use glam::DVec3;

use super::{BlobActor, CollisionSolver};
use crate::world::{Actor, Viewpoint};

/// A secondary body in the scene.
///
/// Only `Blob` is simulatable; `Static` is a fixed prop that can still be
/// looked through or drawn.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Static(Actor),
    Blob(BlobActor),
}

impl Body {
    #[inline]
    pub fn actor(&self) -> &Actor {
        match self {
            Body::Static(a) => a,
            Body::Blob(b) => &b.actor,
        }
    }

    #[inline]
    pub fn is_simulated(&self) -> bool {
        matches!(self, Body::Blob(_))
    }

    pub fn as_blob(&self) -> Option<&BlobActor> {
        match self {
            Body::Blob(b) => Some(b),
            Body::Static(_) => None,
        }
    }

    pub fn as_blob_mut(&mut self) -> Option<&mut BlobActor> {
        match self {
            Body::Blob(b) => Some(b),
            Body::Static(_) => None,
        }
    }

    /// Step the body if it is simulatable; props never move.
    pub fn update<S: CollisionSolver + ?Sized>(&mut self, solver: &S) {
        if let Body::Blob(b) = self {
            b.update(solver);
        }
    }
}

impl Viewpoint for Body {
    fn eye(&self) -> DVec3 {
        self.actor().position
    }
    fn direction(&self) -> DVec3 {
        self.actor().direction
    }
    fn up(&self) -> DVec3 {
        self.actor().up
    }
}
