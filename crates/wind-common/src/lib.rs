//! Common types shared across the wind-field engine.

pub mod bbox;
pub mod error;
pub mod field;
pub mod point;
pub mod style;

pub use bbox::GeoBounds;
pub use error::{FieldError, FieldResult};
pub use field::{CellWeights, ComponentTag, FieldHeader, WeatherField, WindField, WindVector};
pub use point::{
    wind_components, GeoPoint, GridPoint, PointKey, SampleValue, WeatherUnits, Wind,
    WindComponents,
};
pub use style::{ColorScale, ColorStop, Rgb};
