//! Assemble WeatherFields from a grid and its cached samples.

use serde::{Deserialize, Serialize};
use wind_common::{ComponentTag, GridPoint, WeatherField, WindField};

use crate::cache::PointCache;
use crate::error::Result;
use crate::grid::Grid;

/// Scalar quantities that can be painted as a heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarParameter {
    Temperature,
    Precipitation,
    PrecipitationProbability,
}

impl ScalarParameter {
    fn extract(&self, point: &GridPoint) -> Option<f64> {
        match self {
            Self::Temperature => point.temperature(),
            Self::Precipitation => point.precipitation(),
            Self::PrecipitationProbability => point.precipitation_prob(),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Precipitation => "mm",
            Self::PrecipitationProbability => "%",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Precipitation => "precipitation",
            Self::PrecipitationProbability => "precipitation_probability",
        }
    }
}

fn collect<F>(grid: &Grid, cache: &PointCache, extract: F) -> Vec<f64>
where
    F: Fn(&GridPoint) -> Option<f64>,
{
    grid.keys()
        .iter()
        .map(|key| cache.peek(key).and_then(&extract).unwrap_or(f64::NAN))
        .collect()
}

/// Scalar field over the grid; unsampled points become missing values.
pub fn scalar_field(grid: &Grid, cache: &PointCache, parameter: ScalarParameter) -> Result<WeatherField> {
    let mut header = grid.header();
    header.parameter_unit = Some(parameter.unit().to_string());
    header.parameter_number_name = Some(parameter.name().to_string());
    let data = collect(grid, cache, |p| parameter.extract(p));
    Ok(WeatherField::new(header, data)?)
}

/// The eastward/northward wind records, tagged (2,2) and (2,3).
pub fn wind_records(grid: &Grid, cache: &PointCache) -> Result<Vec<WeatherField>> {
    let header = grid.header();
    let u = WeatherField::new(
        header
            .clone()
            .with_parameter(ComponentTag::EASTWARD_WIND, "m.s-1", "eastward_wind"),
        collect(grid, cache, |p| p.components.map(|c| c.u)),
    )?;
    let v = WeatherField::new(
        header.with_parameter(ComponentTag::NORTHWARD_WIND, "m.s-1", "northward_wind"),
        collect(grid, cache, |p| p.components.map(|c| c.v)),
    )?;
    Ok(vec![u, v])
}

/// The wind pair as a ready-to-interpolate field.
pub fn wind_field(grid: &Grid, cache: &PointCache) -> Result<WindField> {
    Ok(WindField::from_records(&wind_records(grid, cache)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wind_common::{GeoBounds, SampleValue, Wind};

    /// 3x3 lattice over (0,0)-(2,2) with the SE node left unsampled.
    fn sampled_grid() -> (Grid, PointCache) {
        let mut cache = PointCache::unbounded();
        let grid = Grid::build(&GeoBounds::new(0.0, 0.0, 2.0, 2.0), 1.0, &mut cache);
        for (n, key) in grid.keys().iter().enumerate() {
            if n == 8 {
                continue;
            }
            cache.set_sample(
                key,
                SampleValue {
                    temperature: Some(n as f64),
                    wind: Wind {
                        speed: Some(10.0),
                        direction: Some(270.0),
                    },
                    ..SampleValue::default()
                },
            );
        }
        (grid, cache)
    }

    #[test]
    fn test_scalar_field_row_major() {
        let (grid, cache) = sampled_grid();
        let f = scalar_field(&grid, &cache, ScalarParameter::Temperature).unwrap();
        assert_eq!(&f.data[..3], &[0.0, 1.0, 2.0]);
        assert_eq!(f.data[7], 7.0);
        assert!(f.data[8].is_nan());
        assert_eq!(f.header.parameter_unit.as_deref(), Some("°C"));
    }

    #[test]
    fn test_wind_records_tagged() {
        let (grid, cache) = sampled_grid();
        let records = wind_records(&grid, &cache).unwrap();
        assert_eq!(records[0].header.tag(), Some(ComponentTag::EASTWARD_WIND));
        assert_eq!(records[1].header.tag(), Some(ComponentTag::NORTHWARD_WIND));
        assert!((records[0].data[0] - 10.0).abs() < 1e-9);
        assert!(records[1].data[0].abs() < 1e-9);
    }

    #[test]
    fn test_wind_field_missing_corner() {
        let (grid, cache) = sampled_grid();
        let wind = wind_field(&grid, &cache).unwrap();
        // NW cell has all four corners
        let nw = wind.interpolate(1.5, 0.5).unwrap();
        assert!((nw.u - 10.0).abs() < 1e-9);
        // SE cell touches the unsampled node
        assert!(wind.interpolate(0.5, 1.5).is_none());
    }
}
