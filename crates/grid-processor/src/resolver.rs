//! Sampling-step selection under a point budget.
//!
//! Viewport bounds are snapped outward to a fixed rounding unit before any
//! lattice is laid out. Two viewports that overlap therefore produce lattices
//! whose nodes coincide exactly, which is what lets the point cache reuse
//! samples across pans and zooms.

use tracing::debug;
use wind_common::GeoBounds;

use crate::error::{GridError, Result};

/// Candidate steps in degrees, finest first.
pub const DEFAULT_STEP_LADDER: [f64; 5] = [0.0625, 0.125, 0.25, 0.5, 1.0];

/// Bounds are snapped to multiples of this (or of the step, when coarser).
pub const SNAP_UNIT: f64 = 0.5;

/// Slack for float noise when counting lattice intervals.
const CEIL_TOLERANCE: f64 = 1e-9;

/// Outcome of a resolution: the chosen step and the lattice it lays out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub step: f64,
    /// Snapped (and padded) bounds; the lattice starts at their NW corner.
    pub bounds: GeoBounds,
    pub nx: usize,
    pub ny: usize,
}

impl Resolution {
    pub fn point_count(&self) -> usize {
        self.nx * self.ny
    }
}

/// Picks a sampling step and lattice for a geographic box.
#[derive(Debug, Clone, PartialEq)]
pub struct GridResolver {
    ladder: Vec<f64>,
    adjustment: f64,
}

impl Default for GridResolver {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_STEP_LADDER.to_vec(),
            adjustment: 0.0,
        }
    }
}

impl GridResolver {
    /// Resolver over a custom ladder; entries are sorted finest first and
    /// non-positive entries are dropped.
    pub fn new(ladder: &[f64]) -> Result<Self> {
        let mut ladder: Vec<f64> = ladder
            .iter()
            .copied()
            .filter(|s| s.is_finite() && *s > 0.0)
            .collect();
        if ladder.is_empty() {
            return Err(GridError::EmptyLadder);
        }
        ladder.sort_by(|a, b| a.total_cmp(b));
        Ok(Self {
            ladder,
            adjustment: 0.0,
        })
    }

    /// Pad snapped bounds by `degrees` on every side.
    pub fn with_adjustment(mut self, degrees: f64) -> Self {
        self.adjustment = if degrees.is_finite() { degrees.max(0.0) } else { 0.0 };
        self
    }

    pub fn ladder(&self) -> &[f64] {
        &self.ladder
    }

    /// Choose a step for `bounds` and lay out the lattice.
    ///
    /// An explicit step is used as given. Otherwise the finest ladder step
    /// whose lattice has at most `max_points` nodes wins, falling back to the
    /// coarsest step when none fits.
    pub fn resolve(
        &self,
        bounds: &GeoBounds,
        max_points: usize,
        explicit_step: Option<f64>,
    ) -> Result<Resolution> {
        if !bounds.is_finite() {
            return Err(GridError::InvalidBounds(format!("{bounds:?}")));
        }
        let bounds = bounds.normalized();

        if let Some(step) = explicit_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(GridError::InvalidStep(step));
            }
            return Ok(self.lay_out(&bounds, step));
        }

        for &step in &self.ladder {
            let resolution = self.lay_out(&bounds, step);
            if resolution.point_count() <= max_points {
                debug!(
                    step,
                    nx = resolution.nx,
                    ny = resolution.ny,
                    max_points,
                    "Selected sampling step"
                );
                return Ok(resolution);
            }
        }

        let coarsest = *self.ladder.last().ok_or(GridError::EmptyLadder)?;
        let resolution = self.lay_out(&bounds, coarsest);
        debug!(
            step = coarsest,
            points = resolution.point_count(),
            max_points,
            "Every step exceeds the point budget, using the coarsest"
        );
        Ok(resolution)
    }

    /// Snapped bounds and lattice size for a fixed step.
    pub fn lay_out(&self, bounds: &GeoBounds, step: f64) -> Resolution {
        let bounds = snap_bounds(bounds, step).expanded(self.adjustment);
        let (nx, ny) = lattice_dims(&bounds, step);
        Resolution {
            step,
            bounds,
            nx,
            ny,
        }
    }
}

/// Snap bounds outward to the rounding unit for `step`.
///
/// A zero-width or zero-height result is widened by one unit east or south
/// so the lattice always spans at least one cell.
pub fn snap_bounds(bounds: &GeoBounds, step: f64) -> GeoBounds {
    let unit = snap_unit(step);
    let mut snapped = GeoBounds {
        west: (bounds.west / unit).floor() * unit,
        south: (bounds.south / unit).floor() * unit,
        east: (bounds.east / unit).ceil() * unit,
        north: (bounds.north / unit).ceil() * unit,
    };
    if snapped.east <= snapped.west {
        snapped.east = snapped.west + unit;
    }
    if snapped.north <= snapped.south {
        snapped.south = snapped.north - unit;
    }
    snapped
}

/// Rounding unit for a step: [`SNAP_UNIT`], or the step itself when coarser.
pub fn snap_unit(step: f64) -> f64 {
    step.max(SNAP_UNIT)
}

/// Columns and rows needed to cover `bounds` at `step`, rounding up.
pub fn lattice_dims(bounds: &GeoBounds, step: f64) -> (usize, usize) {
    let intervals = |span: f64| ((span / step) - CEIL_TOLERANCE).ceil().max(0.0) as usize;
    (intervals(bounds.width()) + 1, intervals(bounds.height()) + 1)
}

/// Step for a map zoom level: ≤7 → 1°, 8 → 0.5°, 9 → 0.25°, 10 → 0.125°,
/// finer zooms → 0.0625°.
pub fn step_for_zoom(zoom: f64) -> f64 {
    if zoom <= 7.0 {
        1.0
    } else if zoom <= 8.0 {
        0.5
    } else if zoom <= 9.0 {
        0.25
    } else if zoom < 11.0 {
        0.125
    } else {
        0.0625
    }
}
