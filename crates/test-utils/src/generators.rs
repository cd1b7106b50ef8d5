//! Synthetic weather fields.
//!
//! These generators create predictable, verifiable fields that can be used
//! across the test suite. Every lattice is anchored at its north-west corner
//! with rows running southward.

use wind_common::{ComponentTag, FieldHeader, WeatherField};

/// Lattice geometry shared by the generators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    /// Longitude of the western column.
    pub west: f64,
    /// Latitude of the northern row.
    pub north: f64,
    pub nx: usize,
    pub ny: usize,
    pub step: f64,
}

impl Lattice {
    pub fn new(west: f64, north: f64, nx: usize, ny: usize, step: f64) -> Self {
        Self {
            west,
            north,
            nx,
            ny,
            step,
        }
    }

    pub fn header(&self) -> FieldHeader {
        FieldHeader::regular(self.west, self.north, self.nx, self.ny, self.step, self.step)
    }

    fn fill<F: Fn(usize, usize) -> f64>(&self, f: F) -> Vec<f64> {
        let mut data = Vec::with_capacity(self.nx * self.ny);
        for row in 0..self.ny {
            for col in 0..self.nx {
                data.push(f(row, col));
            }
        }
        data
    }
}

/// Creates a field where each node is `col * 1000 + row`.
///
/// # Example
///
/// ```
/// use test_utils::{create_test_field, Lattice};
///
/// let field = create_test_field(Lattice::new(0.0, 4.0, 10, 5, 1.0));
/// assert_eq!(field.data.len(), 50);
/// assert_eq!(field.data[1], 1000.0); // col=1, row=0
/// assert_eq!(field.data[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_field(lattice: Lattice) -> WeatherField {
    let data = lattice.fill(|row, col| (col * 1000 + row) as f64);
    WeatherField::new(lattice.header(), data).expect("valid test field")
}

/// Creates a field rising linearly from `west_value` to `east_value`.
pub fn create_gradient_field(lattice: Lattice, west_value: f64, east_value: f64) -> WeatherField {
    let span = (lattice.nx.max(2) - 1) as f64;
    let data = lattice.fill(|_, col| west_value + (east_value - west_value) * col as f64 / span);
    WeatherField::new(lattice.header(), data).expect("valid gradient field")
}

/// Creates a constant field, with `NaN` holes at the listed `(row, col)` nodes.
pub fn create_field_with_holes(lattice: Lattice, value: f64, holes: &[(usize, usize)]) -> WeatherField {
    let data = lattice.fill(|row, col| {
        if holes.contains(&(row, col)) {
            f64::NAN
        } else {
            value
        }
    });
    WeatherField::new(lattice.header(), data).expect("valid field with holes")
}

fn wind_pair(lattice: Lattice, u: Vec<f64>, v: Vec<f64>) -> Vec<WeatherField> {
    let header = lattice.header();
    vec![
        WeatherField::new(
            header
                .clone()
                .with_parameter(ComponentTag::EASTWARD_WIND, "m.s-1", "eastward_wind"),
            u,
        )
        .expect("valid u component"),
        WeatherField::new(
            header.with_parameter(ComponentTag::NORTHWARD_WIND, "m.s-1", "northward_wind"),
            v,
        )
        .expect("valid v component"),
    ]
}

/// Creates a u/v record pair with the same wind everywhere.
pub fn create_uniform_wind_records(lattice: Lattice, u: f64, v: f64) -> Vec<WeatherField> {
    wind_pair(lattice, lattice.fill(|_, _| u), lattice.fill(|_, _| v))
}

/// Creates a u/v record pair circulating counter-clockwise around the
/// lattice center, calm at the center and `max_speed` at the corners.
pub fn create_vortex_wind_records(lattice: Lattice, max_speed: f64) -> Vec<WeatherField> {
    let cx = (lattice.nx as f64 - 1.0) / 2.0;
    let cy = (lattice.ny as f64 - 1.0) / 2.0;
    let max_r = (cx * cx + cy * cy).sqrt().max(1.0);

    // Northward is -row, so (dx, dy_north) = (col - cx, cy - row).
    let u = lattice.fill(|row, _| {
        let dy = cy - row as f64;
        -dy / max_r * max_speed
    });
    let v = lattice.fill(|_, col| {
        let dx = col as f64 - cx;
        dx / max_r * max_speed
    });
    wind_pair(lattice, u, v)
}
