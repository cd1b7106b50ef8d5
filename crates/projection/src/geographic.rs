//! Equirectangular (plate carrée) viewport.

use serde::{Deserialize, Serialize};
use wind_common::GeoBounds;

use crate::CoordinateProjector;

/// Linear mapping of a lat/lon box onto a `width` x `height` canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquirectangularViewport {
    pub bounds: GeoBounds,
    pub width: u32,
    pub height: u32,
}

impl EquirectangularViewport {
    pub fn new(bounds: GeoBounds, width: u32, height: u32) -> Self {
        Self {
            bounds: bounds.normalized(),
            width,
            height,
        }
    }

    fn scale(&self) -> Option<(f64, f64)> {
        let sx = self.width as f64 / self.bounds.width();
        let sy = self.height as f64 / self.bounds.height();
        (sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0).then_some((sx, sy))
    }
}

impl CoordinateProjector for EquirectangularViewport {
    fn project(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        let (sx, sy) = self.scale()?;
        let x = (lon - self.bounds.west) * sx;
        let y = (self.bounds.north - lat) * sy;
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }

    fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (sx, sy) = self.scale()?;
        let lon = self.bounds.west + x / sx;
        let lat = self.bounds.north - y / sy;
        (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn bounds(&self) -> GeoBounds {
        self.bounds
    }
}
