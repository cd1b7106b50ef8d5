//! Common viewport fixtures.

use wind_common::GeoBounds;

/// Galicia, the default demo viewport.
pub const GALICIA: GeoBounds = GeoBounds {
    west: -9.5,
    south: 41.5,
    east: -6.5,
    north: 44.0,
};

/// Iberian peninsula.
pub const IBERIA: GeoBounds = GeoBounds {
    west: -10.0,
    south: 35.5,
    east: 4.5,
    north: 44.0,
};

/// A 1°x1° box on lattice-aligned edges.
pub const ONE_DEGREE: GeoBounds = GeoBounds {
    west: 0.0,
    south: 0.0,
    east: 1.0,
    north: 1.0,
};

/// Zero-area box.
pub const POINT: GeoBounds = GeoBounds {
    west: 2.0,
    south: 2.0,
    east: 2.0,
    north: 2.0,
};

/// Default demo map center (lat, lon) and zoom.
pub const DEMO_CENTER: (f64, f64) = (42.8, -8.0);
pub const DEMO_ZOOM: f64 = 8.0;
