//! Viewer configuration.
//!
//! Loaded from a YAML file when one is given, otherwise defaults; in both
//! cases `WIND_*` environment variables override individual fields.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use grid_processor::GridConfig;
use renderer::{ScalarLayerConfig, SimulatorOptions};
use serde::{Deserialize, Serialize};

use crate::fetcher::DataRequest;
use crate::session::Overlay;

/// Initial map placement for headless runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 42.8,
            center_lon: -8.0,
            zoom: 8.0,
            width: 800,
            height: 600,
        }
    }
}

/// Session behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period after the last viewport change before the grid is rebuilt.
    pub viewport_debounce_ms: u64,
    /// Points per fetch call; one refresh issues several calls concurrently.
    pub fetch_batch_size: usize,
    /// Viewport changes rebuild the grid while enabled.
    pub updates_enabled: bool,
    pub overlay: Overlay,
    pub request: DataRequest,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            viewport_debounce_ms: 300,
            fetch_batch_size: 100,
            updates_enabled: true,
            overlay: Overlay::None,
            request: DataRequest::Current,
        }
    }
}

impl SessionConfig {
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("WIND_VIEWPORT_DEBOUNCE_MS") {
            self.viewport_debounce_ms = v;
        }
        if let Some(v) = env_parse("WIND_FETCH_BATCH_SIZE") {
            self.fetch_batch_size = v;
        }
        if let Some(v) = env_parse("WIND_UPDATES_ENABLED") {
            self.updates_enabled = v;
        }
        if let Ok(v) = std::env::var("WIND_OVERLAY") {
            self.overlay = Overlay::from_str(&v);
        }
    }
}

/// Everything the viewer needs, grouped per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub map: MapConfig,
    pub grid: GridConfig,
    pub wind: SimulatorOptions,
    pub scalar: ScalarLayerConfig,
    pub session: SessionConfig,
}

impl ViewerConfig {
    /// Read a YAML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: ViewerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.grid.apply_env();
        self.wind.apply_env();
        self.scalar.apply_env();
        self.session.apply_env();
    }

    pub fn validate(&self) -> Result<()> {
        self.grid
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid grid configuration")?;
        self.wind
            .validate()
            .context("Invalid wind configuration")?;
        if !(0.0..=1.0).contains(&self.scalar.opacity) {
            bail!("scalar.opacity must be within 0..=1, got {}", self.scalar.opacity);
        }
        if self.session.fetch_batch_size == 0 {
            bail!("session.fetch_batch_size must be > 0");
        }
        if self.map.width == 0 || self.map.height == 0 {
            bail!("map size must be non-zero, got {}x{}", self.map.width, self.map.height);
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
