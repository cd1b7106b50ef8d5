//! Regular lat/lon weather fields and bilinear interpolation.
//!
//! A [`WeatherField`] is a header plus a flat, row-major array with its origin
//! at the north-west corner and rows increasing southward. The same
//! [`CellWeights`] lookup drives scalar interpolation for heatmaps and vector
//! interpolation for the wind pair, so both agree exactly on where a
//! coordinate falls in the lattice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FieldError, FieldResult};

/// Fractional indices within this distance of a lattice edge snap onto it.
const EDGE_EPSILON: f64 = 1e-9;

/// Scan-mode bits this crate can honor (0x80 flips i, 0x40 flips j).
const SUPPORTED_SCAN_BITS: u8 = 0x80 | 0x40;

/// Parameter category/number pair identifying a field component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentTag {
    pub category: u8,
    pub number: u8,
}

impl ComponentTag {
    /// Eastward wind (u).
    pub const EASTWARD_WIND: ComponentTag = ComponentTag {
        category: 2,
        number: 2,
    };
    /// Northward wind (v).
    pub const NORTHWARD_WIND: ComponentTag = ComponentTag {
        category: 2,
        number: 3,
    };

    fn is_eastward_wind(&self) -> bool {
        matches!(self.category, 1 | 2) && self.number == 2
    }

    fn is_northward_wind(&self) -> bool {
        matches!(self.category, 1 | 2) && self.number == 3
    }
}

/// Field header: lattice geometry plus optional parameter metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldHeader {
    /// Longitude of the first (north-west) point.
    pub lo1: f64,
    /// Latitude of the first (north-west) point.
    pub la1: f64,
    /// Longitude of the last (south-east) point.
    pub lo2: f64,
    /// Latitude of the last (south-east) point.
    pub la2: f64,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_category: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_number: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_number_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_definition_template: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_time: Option<DateTime<Utc>>,
    /// Hours after `ref_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_time: Option<i64>,
}

impl FieldHeader {
    /// Header for a north-west anchored lattice; `lo2`/`la2` are derived from
    /// the spacing so the header is always self-consistent.
    pub fn regular(lo1: f64, la1: f64, nx: usize, ny: usize, dx: f64, dy: f64) -> Self {
        Self {
            lo1,
            la1,
            lo2: lo1 + nx.saturating_sub(1) as f64 * dx,
            la2: la1 - ny.saturating_sub(1) as f64 * dy,
            nx,
            ny,
            dx,
            dy,
            parameter_category: None,
            parameter_number: None,
            parameter_unit: None,
            parameter_number_name: None,
            scan_mode: None,
            grid_definition_template: None,
            ref_time: None,
            forecast_time: None,
        }
    }

    /// Attach a component tag and unit.
    pub fn with_parameter(mut self, tag: ComponentTag, unit: &str, name: &str) -> Self {
        self.parameter_category = Some(tag.category);
        self.parameter_number = Some(tag.number);
        self.parameter_unit = Some(unit.to_string());
        self.parameter_number_name = Some(name.to_string());
        self
    }

    pub fn tag(&self) -> Option<ComponentTag> {
        Some(ComponentTag {
            category: self.parameter_category?,
            number: self.parameter_number?,
        })
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// True for global grids whose columns wrap around the antimeridian.
    pub fn is_continuous(&self) -> bool {
        (self.nx as f64 * self.dx.abs()).floor() >= 360.0
    }

    /// Signed steps after applying the scan mode.
    pub fn signed_steps(&self) -> (f64, f64) {
        let mode = self.scan_mode.unwrap_or(0);
        let dx = if mode & 0x80 != 0 { -self.dx } else { self.dx };
        let dy = if mode & 0x40 != 0 { -self.dy } else { self.dy };
        (dx, dy)
    }

    /// Check the header describes a lattice this crate can interpolate.
    pub fn validate(&self) -> FieldResult<()> {
        if self.is_empty() {
            return Err(FieldError::EmptyGrid {
                nx: self.nx,
                ny: self.ny,
            });
        }
        if !(self.dx.is_finite() && self.dy.is_finite() && self.dx > 0.0 && self.dy > 0.0) {
            return Err(FieldError::InvalidSpacing {
                dx: self.dx,
                dy: self.dy,
            });
        }
        if let Some(mode) = self.scan_mode {
            if mode & !SUPPORTED_SCAN_BITS != 0 {
                return Err(FieldError::UnsupportedScanMode(mode));
            }
        }
        if let Some(template) = self.grid_definition_template {
            if template != 0 {
                return Err(FieldError::UnsupportedGridTemplate(template));
            }
        }
        Ok(())
    }

    /// Corner indices and weights for a coordinate, or `None` outside the lattice.
    pub fn cell_weights(&self, lat: f64, lon: f64) -> Option<CellWeights> {
        let (dx, dy) = self.signed_steps();

        let (i0, i1, ti) = axis((self.la1 - lat) / dy, self.ny)?;
        let (j0, j1, tj) = if self.is_continuous() {
            wrapped_axis(floor_mod(lon - self.lo1, 360.0) / dx.abs(), self.nx, dx < 0.0)?
        } else {
            axis((lon - self.lo1) / dx, self.nx)?
        };

        let ri = 1.0 - ti;
        let rj = 1.0 - tj;

        Some(CellWeights {
            indices: [
                i0 * self.nx + j0,
                i0 * self.nx + j1,
                i1 * self.nx + j0,
                i1 * self.nx + j1,
            ],
            weights: [rj * ri, tj * ri, rj * ti, tj * ti],
        })
    }
}

/// Resolve one fractional index against an axis of `n` nodes.
fn axis(frac: f64, n: usize) -> Option<(usize, usize, f64)> {
    if !frac.is_finite() || n == 0 {
        return None;
    }
    let last = (n - 1) as f64;
    let frac = if frac < 0.0 && frac > -EDGE_EPSILON {
        0.0
    } else if frac > last && frac - last < EDGE_EPSILON {
        last
    } else {
        frac
    };
    if frac < 0.0 || frac > last {
        return None;
    }
    if n == 1 {
        return Some((0, 0, 0.0));
    }
    let lo = (frac.floor() as usize).min(n - 2);
    Some((lo, lo + 1, frac - lo as f64))
}

/// Axis for longitudes on a grid that closes on itself.
fn wrapped_axis(frac: f64, n: usize, reversed: bool) -> Option<(usize, usize, f64)> {
    if !frac.is_finite() || n == 0 {
        return None;
    }
    let frac = if reversed { (n as f64 - frac) % n as f64 } else { frac };
    let lo = (frac.floor() as usize).min(n - 1);
    Some((lo, (lo + 1) % n, frac - lo as f64))
}

/// Remainder of floored division, consistent for negative inputs.
fn floor_mod(a: f64, n: f64) -> f64 {
    a - n * (a / n).floor()
}

/// Flat indices of the four enclosing nodes (NW, NE, SW, SE) and their
/// bilinear weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellWeights {
    pub indices: [usize; 4],
    pub weights: [f64; 4],
}

impl CellWeights {
    /// Blend four corner values from `data`; any missing corner yields `None`.
    #[inline]
    pub fn apply(&self, data: &[f64]) -> Option<f64> {
        let mut acc = 0.0;
        for (idx, w) in self.indices.iter().zip(self.weights.iter()) {
            let v = *data.get(*idx)?;
            if v.is_nan() {
                return None;
            }
            acc += v * w;
        }
        Some(acc)
    }
}

/// One scalar or vector component sampled over a regular lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherField {
    pub header: FieldHeader,
    /// Row-major values; NaN (serialized as `null`) marks a missing sample.
    #[serde(with = "nullable_values")]
    pub data: Vec<f64>,
}

impl WeatherField {
    /// Build a field, checking the header and the data length.
    pub fn new(header: FieldHeader, data: Vec<f64>) -> FieldResult<Self> {
        let field = Self { header, data };
        field.validate()?;
        Ok(field)
    }

    /// Parse a single field from JSON.
    pub fn from_json(json: &str) -> FieldResult<Self> {
        let field: WeatherField = serde_json::from_str(json)?;
        field.validate()?;
        Ok(field)
    }

    /// Parse an array of fields (e.g. a u/v wind pair) from JSON.
    pub fn list_from_json(json: &str) -> FieldResult<Vec<Self>> {
        let fields: Vec<WeatherField> = serde_json::from_str(json)?;
        for field in &fields {
            field.validate()?;
        }
        Ok(fields)
    }

    pub fn validate(&self) -> FieldResult<()> {
        self.header.validate()?;
        let expected = self.header.len();
        if self.data.len() != expected {
            return Err(FieldError::LengthMismatch {
                nx: self.header.nx,
                ny: self.header.ny,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Value at lattice node (row `i` from the north, column `j` from the west).
    pub fn value_at(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.header.ny || j >= self.header.nx {
            return None;
        }
        let v = self.data[i * self.header.nx + j];
        (!v.is_nan()).then_some(v)
    }

    /// Bilinear interpolation at an arbitrary coordinate.
    ///
    /// Returns `None` outside the lattice or when an enclosing node has no
    /// value. At an exact node the node value is returned unchanged.
    #[inline]
    pub fn interpolate(&self, lat: f64, lon: f64) -> Option<f64> {
        self.header.cell_weights(lat, lon)?.apply(&self.data)
    }

    /// Minimum and maximum of the present values.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Reference time plus forecast offset, when both are known.
    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        let ref_time = self.header.ref_time?;
        Some(ref_time + Duration::hours(self.header.forecast_time.unwrap_or(0)))
    }
}

/// Interpolated wind in m/s together with its magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindVector {
    pub u: f64,
    pub v: f64,
    pub magnitude: f64,
}

impl WindVector {
    pub fn new(u: f64, v: f64) -> Self {
        Self {
            u,
            v,
            magnitude: (u * u + v * v).sqrt(),
        }
    }
}

/// Eastward and northward components sharing one lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct WindField {
    u: WeatherField,
    v: WeatherField,
}

impl WindField {
    /// Locate the u/v pair by component tag, regardless of array position.
    pub fn from_records(records: &[WeatherField]) -> FieldResult<Self> {
        let mut u = None;
        let mut v = None;
        for record in records {
            match record.header.tag() {
                Some(tag) if tag.is_eastward_wind() => u = Some(record),
                Some(tag) if tag.is_northward_wind() => v = Some(record),
                tag => debug!(?tag, "ignoring non-wind record"),
            }
        }

        let u = u.ok_or(FieldError::MissingComponent("eastward (u)"))?;
        let v = v.ok_or(FieldError::MissingComponent("northward (v)"))?;
        Self::new(u.clone(), v.clone())
    }

    pub fn new(u: WeatherField, v: WeatherField) -> FieldResult<Self> {
        u.validate()?;
        v.validate()?;
        let (a, b) = (&u.header, &v.header);
        if a.nx != b.nx
            || a.ny != b.ny
            || a.lo1 != b.lo1
            || a.la1 != b.la1
            || a.dx != b.dx
            || a.dy != b.dy
            || a.scan_mode != b.scan_mode
        {
            return Err(FieldError::ComponentMismatch);
        }
        Ok(Self { u, v })
    }

    pub fn header(&self) -> &FieldHeader {
        &self.u.header
    }

    pub fn u(&self) -> &WeatherField {
        &self.u
    }

    pub fn v(&self) -> &WeatherField {
        &self.v
    }

    /// Interpolate (u, v) with the scalar primitive and derive the magnitude.
    #[inline]
    pub fn interpolate(&self, lat: f64, lon: f64) -> Option<WindVector> {
        let cell = self.u.header.cell_weights(lat, lon)?;
        let u = cell.apply(&self.u.data)?;
        let v = cell.apply(&self.v.data)?;
        Some(WindVector::new(u, v))
    }

    pub fn into_records(self) -> Vec<WeatherField> {
        vec![self.u, self.v]
    }
}

mod nullable_values {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(data.iter().map(|v| v.is_finite().then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let raw: Vec<Option<f64>> = Vec::deserialize(d)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
