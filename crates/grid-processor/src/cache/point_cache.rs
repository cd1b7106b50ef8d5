//! LRU cache of lattice points keyed by rounded coordinate.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;
use wind_common::{GeoPoint, GridPoint, PointKey, SampleValue};

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

/// Points (and their samples) shared by every grid built for one data request.
///
/// Unbounded unless a capacity is given. A bounded cache never drops below
/// the size of the lattice currently being built, see [`PointCache::reserve`].
pub struct PointCache {
    cache: LruCache<PointKey, GridPoint>,
    bounded: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for PointCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl PointCache {
    pub fn unbounded() -> Self {
        Self {
            cache: LruCache::unbounded(),
            bounded: false,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Cache holding at most `capacity` points; `None` or zero means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => Self {
                cache: LruCache::new(cap),
                bounded: true,
                hits: 0,
                misses: 0,
                evictions: 0,
            },
            None => Self::unbounded(),
        }
    }

    /// Grow a bounded cache so it can hold at least `points` entries.
    pub fn reserve(&mut self, points: usize) {
        if !self.bounded {
            return;
        }
        if let Some(cap) = NonZeroUsize::new(points) {
            if cap > self.cache.cap() {
                self.cache.resize(cap);
            }
        }
    }

    /// Look up a point, marking it recently used.
    pub fn get(&mut self, key: &PointKey) -> Option<&GridPoint> {
        if let Some(point) = self.cache.get(key) {
            self.hits += 1;
            Some(point)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Look up a point without touching LRU order or statistics.
    pub fn peek(&self, key: &PointKey) -> Option<&GridPoint> {
        self.cache.peek(key)
    }

    pub fn contains(&self, key: &PointKey) -> bool {
        self.cache.contains(key)
    }

    /// Return the point at `at`, creating it when absent.
    ///
    /// The boolean is `true` when the point was created by this call.
    pub fn get_or_insert(&mut self, at: GeoPoint) -> (PointKey, bool) {
        let key = at.key();
        if self.get(&key).is_some() {
            return (key, false);
        }
        if let Some((evicted, _)) = self.cache.push(key, GridPoint::new(at)) {
            if evicted != key {
                self.evictions += 1;
            }
        }
        (key, true)
    }

    /// Store a sample for a cached point. Returns `false` when the point is
    /// no longer cached.
    pub fn set_sample(&mut self, key: &PointKey, sample: SampleValue) -> bool {
        match self.cache.peek_mut(key) {
            Some(point) => {
                point.set_sample(sample);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
            evictions: self.evictions,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
