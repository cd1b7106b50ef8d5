//! Spherical Web Mercator viewport.
//!
//! World pixel space is `256 * 2^zoom` pixels wide at every zoom, with the
//! origin at (85.0511°N, 180°W). A viewport is a window of that world space
//! centered on a geographic point.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use wind_common::GeoBounds;

use crate::CoordinateProjector;

/// Tile size at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude where the square Mercator world ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// A Web Mercator map view of a fixed pixel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebMercatorViewport {
    pub center_lat: f64,
    pub center_lon: f64,
    /// Fractional zoom levels are allowed.
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl WebMercatorViewport {
    pub fn new(center_lat: f64, center_lon: f64, zoom: f64, width: u32, height: u32) -> Self {
        Self {
            center_lat: center_lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
            center_lon,
            zoom,
            width,
            height,
        }
    }

    /// World width in pixels at the current zoom.
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2f64.powf(self.zoom)
    }

    fn to_world(&self, lat: f64, lon: f64) -> (f64, f64) {
        let size = self.world_size();
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = (lon + 180.0) / 360.0 * size;
        let y = (1.0 - (PI / 4.0 + lat / 2.0).tan().ln() / PI) / 2.0 * size;
        (x, y)
    }

    fn from_world(&self, x: f64, y: f64) -> (f64, f64) {
        let size = self.world_size();
        let lon = x / size * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();
        (lat, lon)
    }

    /// Top-left corner of the view in world pixels.
    fn origin(&self) -> (f64, f64) {
        let (cx, cy) = self.to_world(self.center_lat, self.center_lon);
        (cx - self.width as f64 / 2.0, cy - self.height as f64 / 2.0)
    }

    /// Move the view by a pixel offset (positive `dx` pans east, positive `dy` south).
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let (cx, cy) = self.to_world(self.center_lat, self.center_lon);
        let (lat, lon) = self.from_world(cx + dx, cy + dy);
        self.center_lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        self.center_lon = lon;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl CoordinateProjector for WebMercatorViewport {
    fn project(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !(lat.is_finite() && lon.is_finite()) {
            return None;
        }
        let (wx, wy) = self.to_world(lat, lon);
        let (ox, oy) = self.origin();
        Some((wx - ox, wy - oy))
    }

    fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let (ox, oy) = self.origin();
        Some(self.from_world(x + ox, y + oy))
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn bounds(&self) -> GeoBounds {
        let (ox, oy) = self.origin();
        let (north, west) = self.from_world(ox, oy);
        let (south, east) = self.from_world(ox + self.width as f64, oy + self.height as f64);
        GeoBounds::new(west, south, east, north)
    }
}
