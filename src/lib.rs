//! Circles bouncing off each other and the walls of a rectangle, advanced by
//! a multi-threaded scalar, an AVX2 or a GPU compute backend.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod framepace;
pub mod grid;
pub mod kernel;
pub mod particle;
pub mod simulation;
pub mod stats;
pub mod utils;

pub use backend::{BackendKind, SimulationStep};
pub use bridge::{FrameBridge, HeadlessBridge};
pub use config::{Bounds, SimulationConfig};
pub use error::{Result, SimError};
pub use particle::{Particle, ParticleStore};
pub use simulation::Simulation;
