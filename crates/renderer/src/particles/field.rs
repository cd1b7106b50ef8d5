//! Pixel-space vector field built from a geographic wind field.
//!
//! Building is split into column batches so a host loop can interleave it
//! with other work: [`FieldBuildTask::step`] runs until its wall-clock budget
//! is spent and reports whether the field is complete.

use std::time::{Duration, Instant};

use projection::CoordinateProjector;
use rand::Rng;
use wind_common::{WindField, WindVector};

/// Angular offset (degrees) for the finite-difference projection derivatives.
pub const DISTORTION_STEP_DEG: f64 = 5.0;

/// Pixels between evaluated samples; each sample fills a 2x2 block.
pub const BUILD_STRIDE: i32 = 2;

const MAX_SPAWN_ATTEMPTS: usize = 30;

/// Pixel region animated by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: i32,
    pub y: i32,
    /// Exclusive end column.
    pub x_max: i32,
    /// Inclusive last row.
    pub y_max: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelBounds {
    /// Bounds from the canvas-space corners of the visible extent.
    pub fn new(upper_left: (f64, f64), lower_right: (f64, f64), width: u32, height: u32) -> Self {
        let x = upper_left.0.round() as i32;
        let y = (upper_left.1.floor() as i32).max(0);
        let y_max = (lower_right.1.ceil() as i32).min(height as i32 - 1);
        Self {
            x,
            y,
            x_max: width as i32,
            y_max,
            width,
            height,
        }
    }

    /// The whole canvas.
    pub fn canvas(width: u32, height: u32) -> Self {
        Self::new((0.0, 0.0), (width as f64, height as f64), width, height)
    }
}

/// Wind at one pixel: displacement in pixels per frame plus speed in m/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelVector {
    pub u: f32,
    pub v: f32,
    pub magnitude: f32,
}

/// Outcome of a field lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSample {
    Vector(PixelVector),
    /// Inside the canvas but without wind data.
    NoData,
    /// Off the canvas.
    Outside,
}

impl FieldSample {
    pub fn vector(self) -> Option<PixelVector> {
        match self {
            FieldSample::Vector(v) => Some(v),
            _ => None,
        }
    }
}

/// Dense per-pixel wind over the canvas.
#[derive(Debug, Clone)]
pub struct VectorField {
    bounds: PixelBounds,
    width: usize,
    height: usize,
    cells: Vec<Option<PixelVector>>,
}

impl VectorField {
    fn empty(bounds: PixelBounds) -> Self {
        let width = bounds.width as usize;
        let height = bounds.height as usize;
        Self {
            bounds,
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    pub fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    /// Look up the pixel nearest to `(x, y)`; halves round up.
    pub fn sample(&self, x: f64, y: f64) -> FieldSample {
        let col = (x + 0.5).floor();
        let row = (y + 0.5).floor();
        if !(col >= 0.0 && row >= 0.0 && col < self.width as f64 && row < self.height as f64) {
            return FieldSample::Outside;
        }
        match self.cells[row as usize * self.width + col as usize] {
            Some(v) => FieldSample::Vector(v),
            None => FieldSample::NoData,
        }
    }

    /// A random pixel, retried until it lands on wind data. After the last
    /// attempt the position is returned as is.
    pub fn random_position<R: Rng>(&self, rng: &mut R) -> (f64, f64) {
        let mut position = (self.bounds.x as f64, self.bounds.y as f64);
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let x = (rng.gen::<f64>() * self.bounds.width as f64).floor() + self.bounds.x as f64;
            let y = (rng.gen::<f64>() * self.bounds.height as f64).floor() + self.bounds.y as f64;
            position = (x, y);
            if self.sample(x, y).vector().is_some() {
                break;
            }
        }
        position
    }

    /// Number of pixels carrying wind.
    pub fn coverage(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn fill_block(&mut self, x: i32, y: i32, value: Option<PixelVector>) {
        for row in y..y + BUILD_STRIDE {
            for col in x..x + BUILD_STRIDE {
                if col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height {
                    self.cells[row as usize * self.width + col as usize] = value;
                }
            }
        }
    }
}

/// Convert geographic wind at a pixel into a pixel displacement.
///
/// The forward projection's local partial derivatives are estimated by
/// stepping [`DISTORTION_STEP_DEG`] along each axis (toward the equator and
/// the prime meridian). Longitude derivatives are divided by cos(lat) since a
/// degree of longitude shrinks toward the poles.
pub fn distort(
    projector: &dyn CoordinateProjector,
    lat: f64,
    lon: f64,
    x: f64,
    y: f64,
    scale: f64,
    wind: WindVector,
) -> Option<PixelVector> {
    let h_lon = if lon < 0.0 { DISTORTION_STEP_DEG } else { -DISTORTION_STEP_DEG };
    let h_lat = if lat < 0.0 { DISTORTION_STEP_DEG } else { -DISTORTION_STEP_DEG };
    let (lon_x, lon_y) = projector.project(lat, lon + h_lon)?;
    let (lat_x, lat_y) = projector.project(lat + h_lat, lon)?;
    let k = lat.to_radians().cos();

    let d = [
        (lon_x - x) / h_lon / k,
        (lon_y - y) / h_lon / k,
        (lat_x - x) / h_lat,
        (lat_y - y) / h_lat,
    ];
    let us = wind.u * scale;
    let vs = wind.v * scale;
    let u = d[0] * us + d[2] * vs;
    let v = d[1] * us + d[3] * vs;

    (u.is_finite() && v.is_finite()).then_some(PixelVector {
        u: u as f32,
        v: v as f32,
        magnitude: wind.magnitude as f32,
    })
}

/// Resumable construction of a [`VectorField`].
pub struct FieldBuildTask {
    wind: WindField,
    velocity_scale: f64,
    next_x: i32,
    field: VectorField,
}

impl FieldBuildTask {
    pub fn new(wind: WindField, bounds: PixelBounds, velocity_scale: f64) -> Self {
        Self {
            wind,
            velocity_scale,
            next_x: bounds.x,
            field: VectorField::empty(bounds),
        }
    }

    pub fn is_done(&self) -> bool {
        self.next_x >= self.field.bounds.x_max
    }

    /// Fraction of columns built so far.
    pub fn progress(&self) -> f64 {
        let b = self.field.bounds;
        let span = (b.x_max - b.x).max(1) as f64;
        ((self.next_x - b.x) as f64 / span).clamp(0.0, 1.0)
    }

    /// Build columns until `budget` has elapsed; at least one column is built
    /// per call. Returns true once every column is done.
    pub fn step(&mut self, projector: &dyn CoordinateProjector, budget: Duration) -> bool {
        let started = Instant::now();
        while !self.is_done() {
            self.build_column(projector, self.next_x);
            self.next_x += BUILD_STRIDE;
            if started.elapsed() >= budget {
                break;
            }
        }
        self.is_done()
    }

    /// Build everything in one go.
    pub fn run(mut self, projector: &dyn CoordinateProjector) -> VectorField {
        while !self.is_done() {
            self.build_column(projector, self.next_x);
            self.next_x += BUILD_STRIDE;
        }
        self.field
    }

    pub fn finish(self) -> VectorField {
        self.field
    }

    fn build_column(&mut self, projector: &dyn CoordinateProjector, x: i32) {
        let bounds = self.field.bounds;
        let mut y = bounds.y;
        while y <= bounds.y_max {
            let (px, py) = (x as f64, y as f64);
            let value = projector.invert(px, py).and_then(|(lat, lon)| {
                let wind = self.wind.interpolate(lat, lon)?;
                distort(projector, lat, lon, px, py, self.velocity_scale, wind)
            });
            self.field.fill_block(x, y, value);
            y += BUILD_STRIDE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection::EquirectangularViewport;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use test_utils::{create_uniform_wind_records, Lattice};
    use wind_common::GeoBounds;

    fn view() -> EquirectangularViewport {
        EquirectangularViewport::new(GeoBounds::new(0.0, 0.0, 4.0, 4.0), 40, 40)
    }

    fn build(u: f64, v: f64) -> VectorField {
        let records = create_uniform_wind_records(Lattice::new(0.0, 4.0, 5, 5, 1.0), u, v);
        let wind = WindField::from_records(&records).unwrap();
        FieldBuildTask::new(wind, PixelBounds::canvas(40, 40), 0.01).run(&view())
    }

    #[test]
    fn test_pixel_bounds_clamp_rows() {
        let b = PixelBounds::new((0.4, -3.2), (100.0, 80.7), 100, 80);
        assert_eq!((b.x, b.y, b.x_max, b.y_max), (0, 0, 100, 79));
    }

    #[test]
    fn test_uniform_field_covers_canvas() {
        let field = build(10.0, 0.0);
        assert_eq!(field.coverage(), 40 * 40);
        let v = field.sample(10.0, 10.0).vector().unwrap();
        assert!(v.u > 0.0);
        assert!(v.v.abs() < 1e-6);
        assert!((v.magnitude - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_northward_wind_moves_up() {
        let field = build(0.0, 5.0);
        let v = field.sample(20.0, 20.0).vector().unwrap();
        assert!(v.v < 0.0);
        assert!(v.u.abs() < 1e-6);
    }

    #[test]
    fn test_sample_outside_canvas() {
        let field = build(1.0, 1.0);
        assert_eq!(field.sample(-1.0, 5.0), FieldSample::Outside);
        assert_eq!(field.sample(5.0, 39.6), FieldSample::Outside);
        assert!(field.sample(39.4, 0.0).vector().is_some());
    }

    #[test]
    fn test_budgeted_build_makes_progress() {
        let records = create_uniform_wind_records(Lattice::new(0.0, 4.0, 5, 5, 1.0), 1.0, 1.0);
        let wind = WindField::from_records(&records).unwrap();
        let mut task = FieldBuildTask::new(wind, PixelBounds::canvas(40, 40), 0.01);
        assert!(!task.step(&view(), Duration::ZERO));
        assert!(task.progress() > 0.0 && task.progress() < 1.0);
        while !task.step(&view(), Duration::ZERO) {}
        assert_eq!(task.finish().coverage(), 1600);
    }

    #[test]
    fn test_random_position_lands_on_data() {
        let field = build(1.0, 0.0);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let (x, y) = field.random_position(&mut rng);
            assert!(field.sample(x, y).vector().is_some());
        }
    }
}
