//! Point queries against cached samples.

use serde::Serialize;
use wind_common::GridPoint;

use crate::cache::PointCache;
use crate::error::{GridError, Result};
use crate::grid::Grid;

/// Sample values interpolated between the four nodes around a coordinate.
///
/// A quantity is `None` when any corner lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct InterpolatedSample {
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub precipitation_prob: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Direction the wind comes from, in [0, 360).
    pub wind_direction: Option<f64>,
}

/// Bilinear point query over the grid's cached samples.
///
/// Fails when the coordinate is outside the lattice or a corner has never
/// been sampled. Wind direction is derived from the interpolated u/v
/// components so it stays continuous across north.
pub fn sample_at(grid: &Grid, cache: &PointCache, lat: f64, lon: f64) -> Result<InterpolatedSample> {
    let cell = grid
        .header()
        .cell_weights(lat, lon)
        .ok_or(GridError::OutsideGrid { lat, lon })?;

    let mut corners: Vec<&GridPoint> = Vec::with_capacity(4);
    for idx in cell.indices {
        let key = grid.keys()[idx];
        let point = cache
            .peek(&key)
            .filter(|p| p.has_sample())
            .ok_or(GridError::MissingSample(key))?;
        corners.push(point);
    }

    let blend = |extract: &dyn Fn(&GridPoint) -> Option<f64>| -> Option<f64> {
        let mut acc = 0.0;
        for (point, w) in corners.iter().zip(cell.weights) {
            acc += extract(*point)? * w;
        }
        Some(acc)
    };

    let u = blend(&|p: &GridPoint| p.components.map(|c| c.u));
    let v = blend(&|p: &GridPoint| p.components.map(|c| c.v));
    let wind_direction = match (u, v) {
        (Some(u), Some(v)) if u != 0.0 || v != 0.0 => {
            Some((-u).atan2(-v).to_degrees().rem_euclid(360.0))
        }
        _ => None,
    };

    Ok(InterpolatedSample {
        temperature: blend(&|p: &GridPoint| p.temperature()),
        precipitation: blend(&|p: &GridPoint| p.precipitation()),
        precipitation_prob: blend(&|p: &GridPoint| p.precipitation_prob()),
        wind_speed: blend(&|p: &GridPoint| p.wind().speed),
        wind_direction,
    })
}
