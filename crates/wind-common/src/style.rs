//! Colors and value→color scales for scalar layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FieldError, FieldResult};

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear per-channel blend, `t` clamped to [0, 1], rounded to nearest.
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + t * (b as f64 - a as f64)).round() as u8;
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

impl FromStr for Rgb {
    type Err = FieldError;

    /// Accepts `#rrggbb`, `rgb(r, g, b)` and `rgba(r, g, b, a)` (alpha ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || FieldError::InvalidColor(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 {
                return Err(invalid());
            }
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            return Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?));
        }

        let inner = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let channels: Vec<u8> = inner
            .split(',')
            .take(3)
            .map(|c| c.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;

        match channels.as_slice() {
            [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Channels([u8; 3]),
        }

        match Repr::deserialize(d)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Channels([r, g, b]) => Ok(Rgb::new(r, g, b)),
        }
    }
}

/// One value→color anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(value: f64, color: Rgb) -> Self {
        Self { value, color }
    }
}

/// Piecewise-linear color ramp over ascending stops.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColorScale {
    stops: Vec<ColorStop>,
}

impl ColorScale {
    /// Build a scale; stops are sorted by value.
    pub fn new(mut stops: Vec<ColorStop>) -> FieldResult<Self> {
        if stops.is_empty() {
            return Err(FieldError::InvalidColorScale("no stops".to_string()));
        }
        if stops.iter().any(|s| !s.value.is_finite()) {
            return Err(FieldError::InvalidColorScale(
                "stop values must be finite".to_string(),
            ));
        }
        stops.sort_by(|a, b| a.value.total_cmp(&b.value));
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Map a value to a color: clamped outside the range, blended between the
    /// bracketing stops inside it.
    pub fn color_for(&self, value: f64) -> Rgb {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if value <= first.value {
            return first.color;
        }
        if value >= last.value {
            return last.color;
        }

        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if value >= lo.value && value <= hi.value {
                let span = hi.value - lo.value;
                if span <= 0.0 {
                    return hi.color;
                }
                return lo.color.lerp(hi.color, (value - lo.value) / span);
            }
        }

        last.color
    }

    /// Air temperature in °C.
    pub fn temperature() -> Self {
        Self {
            stops: vec![
                ColorStop::new(-15.0, Rgb::new(113, 190, 207)),
                ColorStop::new(-8.0, Rgb::new(137, 204, 197)),
                ColorStop::new(-4.0, Rgb::new(120, 184, 206)),
                ColorStop::new(0.0, Rgb::new(98, 129, 207)),
                ColorStop::new(1.0, Rgb::new(128, 167, 132)),
                ColorStop::new(10.0, Rgb::new(181, 202, 96)),
                ColorStop::new(21.0, Rgb::new(242, 177, 59)),
                ColorStop::new(30.0, Rgb::new(235, 96, 49)),
                ColorStop::new(47.0, Rgb::new(112, 45, 21)),
            ],
        }
    }

    /// Precipitation in mm.
    pub fn precipitation() -> Self {
        Self {
            stops: vec![
                ColorStop::new(0.0, Rgb::new(255, 255, 255)),
                ColorStop::new(1.0, Rgb::new(200, 255, 255)),
                ColorStop::new(5.0, Rgb::new(100, 200, 255)),
                ColorStop::new(10.0, Rgb::new(0, 100, 255)),
                ColorStop::new(25.0, Rgb::new(0, 0, 255)),
                ColorStop::new(50.0, Rgb::new(128, 0, 255)),
            ],
        }
    }
}

impl<'de> Deserialize<'de> for ColorScale {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let stops = Vec::<ColorStop>::deserialize(d)?;
        ColorScale::new(stops).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("rgb(36,104, 180)".parse::<Rgb>().unwrap(), Rgb::new(36, 104, 180));
        assert_eq!("rgba(1, 2, 3, 0.5)".parse::<Rgb>().unwrap(), Rgb::new(1, 2, 3));
        assert_eq!("#ff8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert!("rgb(1,2)".parse::<Rgb>().is_err());
        assert!("#fff".parse::<Rgb>().is_err());
        assert!("blue".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_clamps_outside_range() {
        let scale = ColorScale::temperature();
        assert_eq!(scale.color_for(-40.0), Rgb::new(113, 190, 207));
        assert_eq!(scale.color_for(60.0), Rgb::new(112, 45, 21));
    }

    #[test]
    fn test_blends_between_stops() {
        let scale = ColorScale::new(vec![
            ColorStop::new(0.0, Rgb::new(0, 0, 0)),
            ColorStop::new(10.0, Rgb::new(100, 200, 250)),
        ])
        .unwrap();
        assert_eq!(scale.color_for(5.0), Rgb::new(50, 100, 125));
    }

    #[test]
    fn test_unsorted_stops_are_sorted() {
        let scale = ColorScale::new(vec![
            ColorStop::new(10.0, Rgb::WHITE),
            ColorStop::new(0.0, Rgb::BLACK),
        ])
        .unwrap();
        assert_eq!(scale.stops()[0].value, 0.0);
        assert_eq!(scale.color_for(-1.0), Rgb::BLACK);
    }

    #[test]
    fn test_empty_scale_rejected() {
        assert!(ColorScale::new(vec![]).is_err());
    }

    #[test]
    fn test_deserialize_array_and_string_colors() {
        let json = r#"[{"value": 0, "color": [0, 0, 0]}, {"value": 1, "color": "rgb(255,255,255)"}]"#;
        let scale: ColorScale = serde_json::from_str(json).unwrap();
        assert_eq!(scale.stops()[1].color, Rgb::WHITE);
    }
}
