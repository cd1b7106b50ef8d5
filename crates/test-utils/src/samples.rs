//! Factories for per-point sample values.

use chrono::Utc;
use wind_common::{SampleValue, WeatherUnits, Wind};

/// A sample with every quantity set, timestamped now.
pub fn uniform_sample(temperature: f64, wind_speed: f64, wind_direction: f64) -> SampleValue {
    SampleValue {
        temperature: Some(temperature),
        precipitation: Some(0.0),
        precipitation_prob: Some(0.0),
        wind: Wind {
            speed: Some(wind_speed),
            direction: Some(wind_direction),
        },
        timestamp: Some(Utc::now()),
        units: WeatherUnits::default(),
    }
}

/// A sample carrying only wind.
pub fn wind_sample(speed: f64, direction: f64) -> SampleValue {
    SampleValue {
        wind: Wind {
            speed: Some(speed),
            direction: Some(direction),
        },
        timestamp: Some(Utc::now()),
        ..SampleValue::default()
    }
}

/// A sample whose wind speed is reported in km/h.
pub fn kmh_wind_sample(speed_kmh: f64, direction: f64) -> SampleValue {
    SampleValue {
        units: WeatherUnits {
            wind_speed: "km/h".to_string(),
            ..WeatherUnits::default()
        },
        ..wind_sample(speed_kmh, direction)
    }
}
