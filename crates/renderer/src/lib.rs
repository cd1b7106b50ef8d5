//! Off-screen rendering of wind and scalar weather layers.
//!
//! Two layer kinds draw into a [`tiny_skia::Pixmap`] sized to the map:
//! - [`ScalarRenderer`]: per-pixel color overlay for temperature or
//!   precipitation, repainted after a short debounce
//! - [`ParticleSimulator`]: animated wind particles with fading trails
//!
//! Both implement [`Drawable`] and are hosted by a [`CanvasLayer`], which
//! forwards the map lifecycle (attach, resize, viewport change, detach).
//! Frames can be exported with [`png::encode_pixmap`].

pub mod error;
pub mod layer;
pub mod particles;
pub mod png;
pub mod scalar;
pub mod schedule;

pub use error::{RenderError, Result};
pub use layer::{CanvasLayer, Drawable, FrameInfo};
pub use particles::{
    OptionsPatch, Particle, ParticleSimulator, PixelBounds, SimulatorOptions, SimulatorState,
    StartParams,
};
pub use scalar::{paint_lattice, paint_scalar_field, ScalarLayerConfig, ScalarRenderer};
pub use schedule::{Debouncer, FramePacer};
