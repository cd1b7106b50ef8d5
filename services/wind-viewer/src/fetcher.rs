//! Weather data sources for grid points.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use wind_common::{GeoPoint, SampleValue, WeatherUnits, Wind};

/// Which data a grid shows. Each request owns its own point cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataRequest {
    #[default]
    Current,
    Forecast {
        start: NaiveDate,
        end: NaiveDate,
    },
    HourlyForecast {
        start: NaiveDate,
        end: NaiveDate,
        hour: u8,
    },
}

impl DataRequest {
    /// Stable key identifying the request's cache.
    pub fn key(&self) -> String {
        match self {
            Self::Current => "current".to_string(),
            Self::Forecast { start, end } => format!("forecast_{}_{}", start, end),
            Self::HourlyForecast { start, end, hour } => {
                format!("hourly_{}_{}_{:02}", start, end, hour)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("weather source unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("expected {expected} samples, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Supplies one sample per requested point, in request order.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, request: &DataRequest, points: &[GeoPoint]) -> Result<Vec<SampleValue>, FetchError>;
}

/// Base value and symmetric spread for one random quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub base: f64,
    pub variance: f64,
}

impl Spread {
    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.variance > 0.0 {
            self.base + rng.gen_range(-self.variance..=self.variance)
        } else {
            self.base
        }
    }
}

/// Plausible synthetic weather for demos and headless runs.
///
/// Base values are drawn once per fetcher so neighboring points look alike;
/// each point then varies around them.
pub struct RandomFetcher {
    temperature: Spread,
    wind_speed: Spread,
    wind_direction: Spread,
    precipitation: Spread,
    rng: Mutex<StdRng>,
}

impl RandomFetcher {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let temperature = Spread {
            base: rng.gen_range(5.0..=25.0),
            variance: 5.0,
        };
        let wind_speed = Spread {
            base: rng.gen_range(5.0..=15.0),
            variance: 2.5,
        };
        // Per-point directions land 45° before to 135° past the drawn heading.
        let heading: f64 = rng.gen_range(0.0..360.0);
        let wind_direction = Spread {
            base: normalize_degrees(heading + 45.0),
            variance: 90.0,
        };
        let precipitation = Spread {
            base: rng.gen_range(0.0..=5.0),
            variance: 1.0,
        };
        debug!(
            temperature = temperature.base,
            wind_speed = wind_speed.base,
            wind_direction = wind_direction.base,
            "random weather source ready"
        );
        Self {
            temperature,
            wind_speed,
            wind_direction,
            precipitation,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn wind_direction(&self) -> Spread {
        self.wind_direction
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> SampleValue {
        let precipitation = self.precipitation.sample(rng).max(0.0);
        SampleValue {
            temperature: Some(self.temperature.sample(rng)),
            precipitation: Some(precipitation),
            precipitation_prob: Some(if precipitation > 0.0 {
                rng.gen_range(50.0..=100.0)
            } else {
                rng.gen_range(0.0..50.0)
            }),
            wind: Wind {
                speed: Some(self.wind_speed.sample(rng).max(0.0)),
                direction: Some(normalize_degrees(self.wind_direction.sample(rng))),
            },
            timestamp: Some(Utc::now()),
            units: WeatherUnits::default(),
        }
    }
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

#[async_trait]
impl WeatherFetcher for RandomFetcher {
    async fn fetch(&self, _request: &DataRequest, points: &[GeoPoint]) -> Result<Vec<SampleValue>, FetchError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| FetchError::Unavailable("random source poisoned".into()))?;
        Ok(points.iter().map(|_| self.sample(&mut *rng)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keys_are_distinct() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let keys = [
            DataRequest::Current.key(),
            DataRequest::Forecast { start, end }.key(),
            DataRequest::HourlyForecast { start, end, hour: 6 }.key(),
        ];
        assert_eq!(keys[0], "current");
        assert_eq!(keys[2], "hourly_2024-03-01_2024-03-03_06");
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_request_serde() {
        let json = r#"{"type":"hourly_forecast","start":"2024-03-01","end":"2024-03-02","hour":12}"#;
        let request: DataRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(request, DataRequest::HourlyForecast { hour: 12, .. }));
    }

    #[tokio::test]
    async fn test_random_samples_are_plausible() {
        let fetcher = RandomFetcher::new(5);
        let points: Vec<GeoPoint> = (0..200).map(|i| GeoPoint::new(42.0, -8.0 + i as f64 * 0.01)).collect();
        let samples = fetcher.fetch(&DataRequest::Current, &points).await.unwrap();
        assert_eq!(samples.len(), 200);

        let base = fetcher.temperature.base;
        for s in &samples {
            let t = s.temperature.unwrap();
            assert!((t - base).abs() <= 5.0);
            let dir = s.wind.direction.unwrap();
            assert!((0.0..360.0).contains(&dir));
            assert!(s.wind.speed.unwrap() >= 0.0);
            assert!(s.precipitation.unwrap() >= 0.0);
            assert!(s.timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn test_direction_spread_is_skewed_past_heading() {
        let fetcher = RandomFetcher::new(11);
        let spread = fetcher.wind_direction();
        assert_eq!(spread.variance, 90.0);

        let points: Vec<GeoPoint> = (0..100).map(|i| GeoPoint::new(40.0, i as f64 * 0.1)).collect();
        let samples = fetcher.fetch(&DataRequest::Current, &points).await.unwrap();
        let heading = normalize_degrees(spread.base - 45.0);
        for s in &samples {
            let offset = normalize_degrees(s.wind.direction.unwrap() - heading + 45.0) - 45.0;
            assert!((-45.0..=135.0).contains(&offset), "offset {offset}");
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_samples() {
        let points = [GeoPoint::new(1.0, 1.0), GeoPoint::new(2.0, 2.0)];
        let a = RandomFetcher::new(9).fetch(&DataRequest::Current, &points).await.unwrap();
        let b = RandomFetcher::new(9).fetch(&DataRequest::Current, &points).await.unwrap();
        assert_eq!(a[0].temperature, b[0].temperature);
        assert_eq!(a[1].wind.direction, b[1].wind.direction);
    }
}
