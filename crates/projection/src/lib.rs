//! Coordinate transformations between geographic and canvas pixel space.
//!
//! The host map normally owns the projection. Two reference viewports are
//! provided so the engine can run headless:
//! - [`WebMercatorViewport`]: slippy-map style, 256 px tiles at zoom 0
//! - [`EquirectangularViewport`]: plate carrée stretched over a bounding box

pub mod geographic;
pub mod mercator;

pub use geographic::EquirectangularViewport;
pub use mercator::WebMercatorViewport;

use wind_common::GeoBounds;

/// Forward and inverse mapping between lat/lon (degrees) and canvas pixels.
///
/// Pixel origin is the top-left corner of the canvas, `y` grows downward.
pub trait CoordinateProjector {
    /// Geographic coordinate to pixel `(x, y)`.
    fn project(&self, lat: f64, lon: f64) -> Option<(f64, f64)>;

    /// Pixel `(x, y)` to geographic `(lat, lon)`.
    fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)>;

    /// Canvas size in pixels.
    fn size(&self) -> (u32, u32);

    /// Geographic extent currently visible on the canvas.
    fn bounds(&self) -> GeoBounds;
}
