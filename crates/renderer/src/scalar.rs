//! Per-pixel color overlay for scalar fields (temperature, precipitation).

use std::time::{Duration, Instant};

use projection::CoordinateProjector;
use serde::{Deserialize, Serialize};
use tiny_skia::{Color, ColorU8, Pixmap};
use tracing::debug;
use wind_common::{ColorScale, WeatherField};

use crate::error::Result;
use crate::layer::{Drawable, FrameInfo};
use crate::schedule::Debouncer;

/// Scalar overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarLayerConfig {
    /// Global alpha applied to every painted pixel.
    pub opacity: f32,
    /// Quiet period before a repaint.
    pub debounce_ms: u64,
    /// Mark lattice nodes as opaque black pixels.
    pub show_lattice: bool,
}

impl Default for ScalarLayerConfig {
    fn default() -> Self {
        Self {
            opacity: 0.3,
            debounce_ms: 100,
            show_lattice: false,
        }
    }
}

impl ScalarLayerConfig {
    /// Defaults overridden by `WIND_SCALAR_OPACITY`, `WIND_SCALAR_DEBOUNCE_MS`
    /// and `WIND_SHOW_LATTICE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("WIND_SCALAR_OPACITY") {
            self.opacity = v;
        }
        if let Some(v) = env_parse("WIND_SCALAR_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = env_parse("WIND_SHOW_LATTICE") {
            self.show_lattice = v;
        }
    }

    pub fn alpha(&self) -> u8 {
        (self.opacity.clamp(0.0, 1.0) * 255.0).floor() as u8
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Paint every canvas pixel whose inverse projection falls inside `field`.
///
/// The canvas is cleared first; pixels outside the lattice or over missing
/// data stay transparent. Returns the number of painted pixels.
pub fn paint_scalar_field(
    canvas: &mut Pixmap,
    projector: &dyn CoordinateProjector,
    field: &WeatherField,
    scale: &ColorScale,
    alpha: u8,
) -> usize {
    canvas.fill(Color::TRANSPARENT);
    let width = canvas.width() as usize;
    let pixels = canvas.pixels_mut();

    let mut painted = 0;
    for (index, pixel) in pixels.iter_mut().enumerate() {
        let x = (index % width) as f64;
        let y = (index / width) as f64;
        let Some((lat, lon)) = projector.invert(x, y) else {
            continue;
        };
        let Some(value) = field.interpolate(lat, lon) else {
            continue;
        };
        let color = scale.color_for(value);
        *pixel = ColorU8::from_rgba(color.r, color.g, color.b, alpha).premultiply();
        painted += 1;
    }
    painted
}

/// Mark each lattice node of `field` with one opaque black pixel.
pub fn paint_lattice(canvas: &mut Pixmap, projector: &dyn CoordinateProjector, field: &WeatherField) {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let (dx, dy) = field.header.signed_steps();
    let black = ColorU8::from_rgba(0, 0, 0, 255).premultiply();
    let pixels = canvas.pixels_mut();

    for row in 0..field.header.ny {
        let lat = field.header.la1 - row as f64 * dy;
        for col in 0..field.header.nx {
            let lon = field.header.lo1 + col as f64 * dx;
            let Some((x, y)) = projector.project(lat, lon) else {
                continue;
            };
            let (px, py) = (x.round() as i64, y.round() as i64);
            if (0..width).contains(&px) && (0..height).contains(&py) {
                pixels[(py * width + px) as usize] = black;
            }
        }
    }
}

/// Debounced scalar overlay.
///
/// `update` and viewport changes only arm a timer; the actual repaint happens
/// in `draw` once the debounce window has passed, so a burst of updates
/// costs one paint.
pub struct ScalarRenderer {
    config: ScalarLayerConfig,
    scale: ColorScale,
    field: Option<WeatherField>,
    debounce: Debouncer,
    dirty: bool,
}

impl ScalarRenderer {
    pub fn new(scale: ColorScale, config: ScalarLayerConfig) -> Self {
        let debounce = Debouncer::new(Duration::from_millis(config.debounce_ms));
        Self {
            config,
            scale,
            field: None,
            debounce,
            dirty: false,
        }
    }

    /// Replace the field and schedule a repaint.
    pub fn update(&mut self, field: Option<WeatherField>, now: Instant) {
        self.field = field;
        self.dirty = true;
        self.debounce.trigger(now);
    }

    pub fn set_scale(&mut self, scale: ColorScale, now: Instant) {
        self.scale = scale;
        self.dirty = true;
        self.debounce.trigger(now);
    }

    pub fn set_lattice_visible(&mut self, visible: bool, now: Instant) {
        self.config.show_lattice = visible;
        self.dirty = true;
        self.debounce.trigger(now);
    }

    pub fn field(&self) -> Option<&WeatherField> {
        self.field.as_ref()
    }

    pub fn scale(&self) -> &ColorScale {
        &self.scale
    }

    pub fn config(&self) -> &ScalarLayerConfig {
        &self.config
    }

    /// Whether a repaint is waiting on the debounce timer.
    pub fn is_pending(&self) -> bool {
        self.dirty
    }

    /// Paint immediately, bypassing the debounce.
    pub fn paint(&self, canvas: &mut Pixmap, projector: &dyn CoordinateProjector) -> usize {
        let Some(field) = self.field.as_ref() else {
            canvas.fill(Color::TRANSPARENT);
            return 0;
        };
        let painted = paint_scalar_field(canvas, projector, field, &self.scale, self.config.alpha());
        if self.config.show_lattice {
            paint_lattice(canvas, projector, field);
        }
        painted
    }
}

impl Drawable for ScalarRenderer {
    fn draw(&mut self, frame: &mut FrameInfo<'_>) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        if !self.debounce.is_pending() {
            self.debounce.trigger(frame.now);
        }
        if !self.debounce.poll(frame.now) {
            return Ok(false);
        }
        self.dirty = false;
        let painted = self.paint(frame.canvas, frame.projector);
        debug!(painted, "scalar overlay repainted");
        Ok(true)
    }

    fn on_viewport_change(&mut self) {
        // Re-armed with the next frame's clock.
        self.debounce.cancel();
        self.dirty = true;
    }

    fn on_detach(&mut self) {
        self.debounce.cancel();
        self.dirty = false;
    }

    fn next_deadline(&self) -> Option<Instant> {
        if self.dirty {
            self.debounce.deadline()
        } else {
            None
        }
    }
}
