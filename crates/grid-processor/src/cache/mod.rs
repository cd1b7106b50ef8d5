//! Cache implementations for grid processing.

mod point_cache;

pub use point_cache::{CacheStats, PointCache};
