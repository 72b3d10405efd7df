//! Blob physics and a two-portal view synthesiser for a small
//! first-person toy engine.
//!
//! * [`sim`] steps squishy ellipsoid bodies through a level.
//! * [`renderer`] owns the linked portal pair and the render contract,
//!   expressed against the [`renderer::Gpu`] seam.
//! * [`world`] holds the shared data model and static geometry.

pub mod config;
pub mod logging;
pub mod renderer;
pub mod sim;
pub mod world;

pub use config::Settings;
