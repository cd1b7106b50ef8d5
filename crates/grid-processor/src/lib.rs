//! Adaptive sampling grids for viewport-driven weather data.
//!
//! Turns an arbitrary map viewport into a bounded lattice of sample points,
//! caches those points across viewport changes and assembles the cached
//! samples into [`WeatherField`](wind_common::WeatherField)s.
//!
//! # Architecture
//!
//! ```text
//! Viewport bounds
//!      │
//!      ▼
//! GridResolver::resolve(bounds, max_points)
//!      │
//!      ├─► Snap bounds outward to the rounding unit
//!      │
//!      └─► Pick the finest step that fits the point budget
//!               │
//!               ▼
//! Grid::from_resolution(resolution, &mut PointCache)
//!      │
//!      ├─► Key hit: reuse point (and its sample)
//!      │
//!      └─► Key miss: create point, record as new
//!               │
//!               ▼
//! fetch pending points ──► PointCache::set_sample
//!               │
//!               ▼
//! scalar_field / wind_field ──► renderers
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod grid;
pub mod query;
pub mod resolver;

pub use builder::{scalar_field, wind_field, wind_records, ScalarParameter};
pub use cache::{CacheStats, PointCache};
pub use config::{GridConfig, StepPolicy};
pub use error::{GridError, Result};
pub use grid::Grid;
pub use query::{sample_at, InterpolatedSample};
pub use resolver::{
    lattice_dims, snap_bounds, step_for_zoom, GridResolver, Resolution, DEFAULT_STEP_LADDER,
};
