//! Regular sampling lattices materialized against a point cache.

use chrono::{DateTime, Utc};
use tracing::debug;
use wind_common::{FieldHeader, GeoBounds, GeoPoint, PointKey};

use crate::cache::PointCache;
use crate::resolver::{lattice_dims, Resolution};

/// One materialized lattice.
///
/// A grid only holds keys; samples live in the [`PointCache`] it was built
/// against, so a new grid over overlapping bounds sees the samples fetched
/// for the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub bounds: GeoBounds,
    pub point_distance: f64,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    /// Set by the owner; fetch results carry it back so late ones can be dropped.
    pub generation: u64,
    /// Row-major keys, north row first.
    keys: Vec<PointKey>,
    /// Keys created by this build (not present in the cache before).
    new_points: Vec<PointKey>,
}

impl Grid {
    /// Lay out a lattice over already snapped `bounds` at `step`.
    pub fn build(bounds: &GeoBounds, step: f64, cache: &mut PointCache) -> Self {
        let (nx, ny) = lattice_dims(bounds, step);
        Self::materialize(*bounds, step, nx, ny, cache)
    }

    /// Lay out the lattice described by a resolver outcome.
    pub fn from_resolution(resolution: &Resolution, cache: &mut PointCache) -> Self {
        Self::materialize(
            resolution.bounds,
            resolution.step,
            resolution.nx,
            resolution.ny,
            cache,
        )
    }

    fn materialize(
        bounds: GeoBounds,
        step: f64,
        nx: usize,
        ny: usize,
        cache: &mut PointCache,
    ) -> Self {
        cache.reserve(nx * ny);

        let mut keys = Vec::with_capacity(nx * ny);
        let mut new_points = Vec::new();
        for i in 0..ny {
            let latitude = bounds.north - i as f64 * step;
            for j in 0..nx {
                let longitude = bounds.west + j as f64 * step;
                let (key, created) = cache.get_or_insert(GeoPoint::new(latitude, longitude));
                if created {
                    new_points.push(key);
                }
                keys.push(key);
            }
        }

        debug!(
            nx,
            ny,
            step,
            new_points = new_points.len(),
            reused = keys.len() - new_points.len(),
            "Built grid"
        );

        Self {
            bounds,
            point_distance: step,
            nx,
            ny,
            dx: step,
            dy: step,
            generation: 0,
            keys,
            new_points,
        }
    }

    pub fn keys(&self) -> &[PointKey] {
        &self.keys
    }

    pub fn new_points(&self) -> &[PointKey] {
        &self.new_points
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Coordinate of node (row `i` from the north, column `j` from the west).
    pub fn node(&self, i: usize, j: usize) -> GeoPoint {
        GeoPoint::new(
            self.bounds.north - i as f64 * self.dy,
            self.bounds.west + j as f64 * self.dx,
        )
    }

    pub fn key_at(&self, i: usize, j: usize) -> Option<PointKey> {
        if i >= self.ny || j >= self.nx {
            return None;
        }
        self.keys.get(i * self.nx + j).copied()
    }

    /// True when `viewport` lies entirely inside the lattice bounds.
    pub fn covers(&self, viewport: &GeoBounds) -> bool {
        self.bounds.contains(&viewport.normalized())
    }

    /// Field header for this lattice, before any parameter tag is attached.
    pub fn header(&self) -> FieldHeader {
        FieldHeader::regular(
            self.bounds.west,
            self.bounds.north,
            self.nx,
            self.ny,
            self.dx,
            self.dy,
        )
    }

    /// Points that need a fetch: never sampled, stale, or evicted since the
    /// build. Includes every new point.
    pub fn pending_points(&self, cache: &PointCache, now: DateTime<Utc>) -> Vec<(PointKey, GeoPoint)> {
        self.keys
            .iter()
            .filter_map(|key| match cache.peek(key) {
                Some(point) if !point.is_stale(now) => None,
                Some(point) => Some((*key, point.point)),
                None => Some((*key, key.point())),
            })
            .collect()
    }
}
