//! Configuration for grid resolution and point caching.

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_STEP_LADDER;

/// How the sampling step is chosen when none is configured explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Finest ladder step whose lattice fits `max_grid_points`.
    #[default]
    PointBudget,
    /// Fixed step per map zoom level.
    Zoom,
}

impl StepPolicy {
    /// Parse from string (case-insensitive), defaulting to the point budget.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "zoom" => Self::Zoom,
            _ => Self::PointBudget,
        }
    }
}

/// Grid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Upper bound on lattice points per grid.
    pub max_grid_points: usize,

    /// Fixed sampling step in degrees; bypasses the ladder when set.
    pub point_distance: Option<f64>,

    /// Candidate steps, finest first.
    pub step_ladder: Vec<f64>,

    /// Extra padding in degrees added to every side of the snapped bounds.
    pub adjustment: f64,

    /// Maximum cached points per request; unbounded when `None`.
    pub cache_capacity: Option<usize>,

    pub step_policy: StepPolicy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_grid_points: 600,
            point_distance: None,
            step_ladder: DEFAULT_STEP_LADDER.to_vec(),
            adjustment: 0.0,
            cache_capacity: None,
            step_policy: StepPolicy::PointBudget,
        }
    }
}

impl GridConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables that are set.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("WIND_MAX_GRID_POINTS") {
            if let Ok(n) = val.parse() {
                self.max_grid_points = n;
            }
        }

        if let Ok(val) = std::env::var("WIND_POINT_DISTANCE") {
            if let Ok(step) = val.parse() {
                self.point_distance = Some(step);
            }
        }

        if let Ok(val) = std::env::var("WIND_MAP_ADJUSTMENT") {
            if let Ok(adjustment) = val.parse() {
                self.adjustment = adjustment;
            }
        }

        if let Ok(val) = std::env::var("WIND_CACHE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.cache_capacity = Some(capacity);
            }
        }

        if let Ok(val) = std::env::var("WIND_STEP_POLICY") {
            self.step_policy = StepPolicy::from_str(&val);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_grid_points == 0 {
            return Err("max_grid_points must be > 0".to_string());
        }

        if let Some(step) = self.point_distance {
            if !(step.is_finite() && step > 0.0) {
                return Err(format!("point_distance must be positive, got {step}"));
            }
        }

        if self.step_ladder.is_empty() {
            return Err("step_ladder must not be empty".to_string());
        }

        if self.step_ladder.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err("step_ladder entries must be positive".to_string());
        }

        if !(self.adjustment.is_finite() && self.adjustment >= 0.0) {
            return Err("adjustment must be >= 0".to_string());
        }

        if self.cache_capacity == Some(0) {
            return Err("cache_capacity must be > 0 when set".to_string());
        }

        Ok(())
    }
}
