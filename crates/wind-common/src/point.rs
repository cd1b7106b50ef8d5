//! Lattice points and the weather samples attached to them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Decimal places kept in a point key.
pub const KEY_DECIMALS: i32 = 4;

const KEY_SCALE: f64 = 10_000.0;

/// km/h to m/s.
const KMH_TO_MS: f64 = 0.27778;

/// Samples older than this are refetched on the next refresh.
pub fn stale_after() -> Duration {
    Duration::hours(1)
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Cache key of this point.
    pub fn key(&self) -> PointKey {
        PointKey::new(self.latitude, self.longitude)
    }
}

/// Deduplication key: latitude and longitude rounded to 4 decimals.
///
/// Stored as scaled integers so equal keys hash identically regardless of
/// floating-point noise accumulated while stepping across the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl PointKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_e4: (latitude * KEY_SCALE).round() as i64,
            lon_e4: (longitude * KEY_SCALE).round() as i64,
        }
    }

    /// The rounded coordinate this key stands for.
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat_e4 as f64 / KEY_SCALE, self.lon_e4 as f64 / KEY_SCALE)
    }
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.point();
        write!(
            f,
            "{:.prec$}_{:.prec$}",
            p.latitude,
            p.longitude,
            prec = KEY_DECIMALS as usize
        )
    }
}

/// Wind speed (m/s) and the direction it blows FROM (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wind {
    pub speed: Option<f64>,
    pub direction: Option<f64>,
}

/// Units reported by the weather source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherUnits {
    pub temperature: String,
    pub wind_speed: String,
    pub wind_direction: String,
    pub precipitation: String,
}

impl Default for WeatherUnits {
    fn default() -> Self {
        Self {
            temperature: "°C".to_string(),
            wind_speed: "m/s".to_string(),
            wind_direction: "°".to_string(),
            precipitation: "mm".to_string(),
        }
    }
}

/// One observation or forecast value at a lattice point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleValue {
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub precipitation_prob: Option<f64>,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "weatherUnits")]
    pub units: WeatherUnits,
}

impl SampleValue {
    /// Convert wind speed to m/s when the source reported km/h.
    pub fn normalized(mut self) -> Self {
        if self.units.wind_speed.eq_ignore_ascii_case("km/h") {
            self.wind.speed = self.wind.speed.map(|s| s * KMH_TO_MS);
            self.units.wind_speed = "m/s".to_string();
        }
        self
    }

    /// Eastward/northward wind components, if both speed and direction are known.
    pub fn wind_components(&self) -> Option<WindComponents> {
        match (self.wind.speed, self.wind.direction) {
            (Some(speed), Some(direction)) => Some(wind_components(speed, direction)),
            _ => None,
        }
    }
}

/// Eastward (u) and northward (v) wind in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindComponents {
    pub u: f64,
    pub v: f64,
}

/// Convert a meteorological speed/direction pair into u/v components.
///
/// Direction is where the wind comes FROM, so a southerly (180°) wind blows
/// northward and yields a positive v.
pub fn wind_components(speed: f64, direction_deg: f64) -> WindComponents {
    let rad = direction_deg.to_radians();
    WindComponents {
        u: -speed * rad.sin(),
        v: -speed * rad.cos(),
    }
}

/// A cached lattice point together with its latest sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub point: GeoPoint,
    pub sample: Option<SampleValue>,
    /// Derived once per sample update.
    pub components: Option<WindComponents>,
}

impl GridPoint {
    pub fn new(point: GeoPoint) -> Self {
        Self {
            point,
            sample: None,
            components: None,
        }
    }

    pub fn key(&self) -> PointKey {
        self.point.key()
    }

    /// Replace the sample and recompute wind components.
    pub fn set_sample(&mut self, sample: SampleValue) {
        let sample = sample.normalized();
        self.components = sample.wind_components();
        self.sample = Some(sample);
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    /// A point is stale when it has no timestamped sample or the sample is
    /// older than [`stale_after`].
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.sample.as_ref().and_then(|s| s.timestamp) {
            Some(ts) => ts < now - stale_after(),
            None => true,
        }
    }

    pub fn temperature(&self) -> Option<f64> {
        self.sample.as_ref().and_then(|s| s.temperature)
    }

    pub fn precipitation(&self) -> Option<f64> {
        self.sample.as_ref().and_then(|s| s.precipitation)
    }

    pub fn precipitation_prob(&self) -> Option<f64> {
        self.sample.as_ref().and_then(|s| s.precipitation_prob)
    }

    pub fn wind(&self) -> Wind {
        self.sample.as_ref().map(|s| s.wind).unwrap_or_default()
    }
}
