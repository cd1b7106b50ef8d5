//! Simulator settings and their partial-update form.

use serde::{Deserialize, Serialize};
use wind_common::Rgb;

use crate::error::{RenderError, Result};

/// Blue to red ramp used for speed buckets.
pub const DEFAULT_COLOR_SCALE: [Rgb; 10] = [
    Rgb::new(0, 0, 128),
    Rgb::new(0, 0, 255),
    Rgb::new(75, 0, 130),
    Rgb::new(138, 43, 226),
    Rgb::new(255, 0, 255),
    Rgb::new(255, 0, 200),
    Rgb::new(255, 0, 150),
    Rgb::new(255, 0, 100),
    Rgb::new(255, 0, 50),
    Rgb::new(255, 0, 0),
];

/// Particle simulator configuration.
///
/// Field names serialize in camelCase to match the map-layer option surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulatorOptions {
    /// Speed (m/s) mapped to the first color bucket.
    pub min_velocity: f64,
    /// Speed (m/s) mapped to the last color bucket.
    pub max_velocity: f64,
    /// Pixels per frame per m/s, before projection scaling.
    pub velocity_scale: f64,
    /// Frames a particle lives before respawning.
    pub particle_age: u32,
    pub line_width: f32,
    /// Particles per canvas pixel.
    pub particle_multiplier: f64,
    /// Animation frames per second.
    pub frame_rate: f64,
    /// Trail persistence per frame.
    pub opacity: f32,
    pub color_scale: Vec<Rgb>,
    pub device_pixel_ratio: f64,
    /// Wall-clock budget of one field-build batch.
    pub batch_budget_ms: u64,
    /// Pause between field-build batches.
    pub batch_pause_ms: u64,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            min_velocity: 0.0,
            max_velocity: 10.0,
            velocity_scale: 0.005,
            particle_age: 90,
            line_width: 1.0,
            particle_multiplier: 1.0 / 300.0,
            frame_rate: 15.0,
            opacity: 0.97,
            color_scale: DEFAULT_COLOR_SCALE.to_vec(),
            device_pixel_ratio: 1.0,
            batch_budget_ms: 1000,
            batch_pause_ms: 25,
        }
    }
}

impl SimulatorOptions {
    /// Defaults overridden by `WIND_MAX_VELOCITY`, `WIND_VELOCITY_SCALE`,
    /// `WIND_PARTICLE_AGE`, `WIND_PARTICLE_MULTIPLIER` and `WIND_FRAME_RATE`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env();
        options
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("WIND_MAX_VELOCITY") {
            self.max_velocity = v;
        }
        if let Some(v) = env_parse("WIND_VELOCITY_SCALE") {
            self.velocity_scale = v;
        }
        if let Some(v) = env_parse("WIND_PARTICLE_AGE") {
            self.particle_age = v;
        }
        if let Some(v) = env_parse("WIND_PARTICLE_MULTIPLIER") {
            self.particle_multiplier = v;
        }
        if let Some(v) = env_parse("WIND_FRAME_RATE") {
            self.frame_rate = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.color_scale.is_empty() {
            return Err(RenderError::InvalidOptions("color scale is empty".into()));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(RenderError::InvalidOptions(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !(self.particle_multiplier.is_finite() && self.particle_multiplier >= 0.0) {
            return Err(RenderError::InvalidOptions(format!(
                "particle multiplier must be non-negative, got {}",
                self.particle_multiplier
            )));
        }
        if !(self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0) {
            return Err(RenderError::InvalidOptions(format!(
                "device pixel ratio must be positive, got {}",
                self.device_pixel_ratio
            )));
        }
        Ok(())
    }

    /// Color bucket for a speed in m/s.
    pub fn bucket_index(&self, magnitude: f64) -> usize {
        let last = self.color_scale.len().saturating_sub(1);
        let t = (magnitude - self.min_velocity) / (self.max_velocity - self.min_velocity);
        if !t.is_finite() {
            return if magnitude >= self.max_velocity { last } else { 0 };
        }
        let index = (t * last as f64).round();
        index.clamp(0.0, last as f64) as usize
    }

    /// Base velocity scale adjusted for screen density.
    pub fn density_scale(&self) -> f64 {
        self.velocity_scale * self.device_pixel_ratio.cbrt()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// A partial [`SimulatorOptions`]; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptionsPatch {
    pub min_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub velocity_scale: Option<f64>,
    pub particle_age: Option<u32>,
    pub line_width: Option<f32>,
    pub particle_multiplier: Option<f64>,
    pub frame_rate: Option<f64>,
    pub opacity: Option<f32>,
    pub color_scale: Option<Vec<Rgb>>,
}

impl OptionsPatch {
    pub fn color_scale(colors: Vec<Rgb>) -> Self {
        Self {
            color_scale: Some(colors),
            ..Self::default()
        }
    }

    pub fn apply(&self, options: &mut SimulatorOptions) {
        if let Some(v) = self.min_velocity {
            options.min_velocity = v;
        }
        if let Some(v) = self.max_velocity {
            options.max_velocity = v;
        }
        if let Some(v) = self.velocity_scale {
            options.velocity_scale = v;
        }
        if let Some(v) = self.particle_age {
            options.particle_age = v;
        }
        if let Some(v) = self.line_width {
            options.line_width = v;
        }
        if let Some(v) = self.particle_multiplier {
            options.particle_multiplier = v;
        }
        if let Some(v) = self.frame_rate {
            options.frame_rate = v;
        }
        if let Some(v) = self.opacity {
            options.opacity = v;
        }
        if let Some(v) = self.color_scale.as_ref() {
            options.color_scale = v.clone();
        }
    }
}

impl From<&SimulatorOptions> for OptionsPatch {
    fn from(options: &SimulatorOptions) -> Self {
        Self {
            min_velocity: Some(options.min_velocity),
            max_velocity: Some(options.max_velocity),
            velocity_scale: Some(options.velocity_scale),
            particle_age: Some(options.particle_age),
            line_width: Some(options.line_width),
            particle_multiplier: Some(options.particle_multiplier),
            frame_rate: Some(options.frame_rate),
            opacity: Some(options.opacity),
            color_scale: Some(options.color_scale.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = SimulatorOptions::default();
        assert_eq!(o.color_scale.len(), 10);
        assert_eq!(o.particle_age, 90);
        assert!((o.particle_multiplier - 1.0 / 300.0).abs() < 1e-12);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn test_bucket_index_clamps() {
        let o = SimulatorOptions::default();
        assert_eq!(o.bucket_index(-3.0), 0);
        assert_eq!(o.bucket_index(0.0), 0);
        assert_eq!(o.bucket_index(5.0), 5); // 4.5 rounds up
        assert_eq!(o.bucket_index(10.0), 9);
        assert_eq!(o.bucket_index(40.0), 9);
    }

    #[test]
    fn test_bucket_index_with_equal_bounds() {
        let o = SimulatorOptions {
            min_velocity: 5.0,
            max_velocity: 5.0,
            ..SimulatorOptions::default()
        };
        assert_eq!(o.bucket_index(4.0), 0);
        assert_eq!(o.bucket_index(6.0), 9);
    }

    #[test]
    fn test_patch_is_partial() {
        let mut o = SimulatorOptions::default();
        let patch: OptionsPatch =
            serde_json::from_str(r#"{"maxVelocity": 20, "colorScale": ["rgb(255, 255, 255)"]}"#).unwrap();
        patch.apply(&mut o);
        assert_eq!(o.max_velocity, 20.0);
        assert_eq!(o.color_scale, vec![Rgb::WHITE]);
        assert_eq!(o.velocity_scale, 0.005);
    }

    #[test]
    fn test_empty_color_scale_is_invalid() {
        let o = SimulatorOptions {
            color_scale: Vec::new(),
            ..SimulatorOptions::default()
        };
        assert!(matches!(o.validate(), Err(RenderError::InvalidOptions(_))));
    }
}
