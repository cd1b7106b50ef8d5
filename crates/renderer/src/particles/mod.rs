//! Animated wind particles.
//!
//! The wind field is resampled once per viewport into a dense pixel grid
//! (see [`field`]); particles then advect across it frame by frame, leaving
//! fading trails colored by speed.

pub mod field;
pub mod options;
pub mod simulator;

pub use field::{distort, FieldBuildTask, FieldSample, PixelBounds, PixelVector, VectorField};
pub use options::{OptionsPatch, SimulatorOptions, DEFAULT_COLOR_SCALE};
pub use simulator::{velocity_scale, Particle, ParticleSimulator, SimulatorState, StartParams};
