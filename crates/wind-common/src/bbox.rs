//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Longitudes are not normalized; a box may extend past ±180° when the host
/// map is panned across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    /// Create a new bounding box from its four edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Parse a "west,south,east,north" string.
    pub fn from_bbox_string(s: &str) -> Result<Self, BoundsParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BoundsParseError::InvalidFormat(s.to_string()));
        }

        let parse = |p: &str| -> Result<f64, BoundsParseError> {
            p.parse()
                .map_err(|_| BoundsParseError::InvalidNumber(p.to_string()))
        };

        Ok(Self::new(
            parse(parts[0])?,
            parse(parts[1])?,
            parse(parts[2])?,
            parse(parts[3])?,
        )
        .normalized())
    }

    /// Swap inverted edges so that west <= east and south <= north.
    pub fn normalized(&self) -> Self {
        Self {
            west: self.west.min(self.east),
            south: self.south.min(self.north),
            east: self.west.max(self.east),
            north: self.south.max(self.north),
        }
    }

    /// Longitude span in degrees.
    pub fn width(&self) -> f64 {
        (self.east - self.west).abs()
    }

    /// Latitude span in degrees.
    pub fn height(&self) -> f64 {
        (self.north - self.south).abs()
    }

    /// True when either span is zero (or not a number).
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// True when every edge is a finite number.
    pub fn is_finite(&self) -> bool {
        self.west.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.north.is_finite()
    }

    /// Check if a point is contained within this box (edges inclusive).
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Check if `other` lies entirely inside this box.
    pub fn contains(&self, other: &GeoBounds) -> bool {
        self.contains_point(other.north, other.east) && self.contains_point(other.south, other.west)
    }

    /// Check if this box intersects another.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Compute the intersection of two boxes.
    pub fn intersection(&self, other: &GeoBounds) -> Option<GeoBounds> {
        if !self.intersects(other) {
            return None;
        }

        Some(GeoBounds {
            west: self.west.max(other.west),
            south: self.south.max(other.south),
            east: self.east.min(other.east),
            north: self.north.min(other.north),
        })
    }

    /// Grow every edge outward by `margin` degrees.
    pub fn expanded(&self, margin: f64) -> GeoBounds {
        GeoBounds {
            west: self.west - margin,
            south: self.south - margin,
            east: self.east + margin,
            north: self.north + margin,
        }
    }

    /// Edges converted to radians, in (west, south, east, north) order.
    pub fn to_radians(&self) -> [f64; 4] {
        [
            self.west.to_radians(),
            self.south.to_radians(),
            self.east.to_radians(),
            self.north.to_radians(),
        ]
    }

    /// Cache key fragment for this box, quantized to 4 decimals.
    pub fn cache_key(&self) -> String {
        format!(
            "{:.4}_{:.4}_{:.4}_{:.4}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoundsParseError {
    #[error("Invalid bounds format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bounds: {0}")]
    InvalidNumber(String),
}
