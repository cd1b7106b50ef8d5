//! One map session: viewport-driven grids, point fetches and the layers fed
//! from them.
//!
//! The session is driven entirely by the host loop. Every entry point takes
//! the current [`Instant`]; [`WindSession::next_deadline`] tells the host
//! when something will next be due.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use grid_processor::{
    sample_at, scalar_field, step_for_zoom, wind_records, Grid, GridConfig, GridError,
    GridResolver, InterpolatedSample, PointCache, Resolution, ScalarParameter, StepPolicy,
};
use metrics::counter;
use projection::CoordinateProjector;
use renderer::{
    CanvasLayer, Debouncer, OptionsPatch, ParticleSimulator, RenderError, ScalarRenderer,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiny_skia::{Pixmap, PixmapPaint, Transform};
use tracing::{debug, info, warn};
use wind_common::{ColorScale, GeoBounds, GeoPoint, PointKey, Rgb, SampleValue};

use crate::config::ViewerConfig;
use crate::fetcher::{DataRequest, FetchError, WeatherFetcher};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("session is not attached to a surface")]
    NotAttached,

    #[error("no grid has been built yet")]
    NoGrid,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Which scalar overlay is shown under the particles. At most one is visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    #[default]
    None,
    Temperature,
    Precipitation,
}

impl Overlay {
    /// Parse from string (case-insensitive), defaulting to no overlay.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "temperature" | "temp" => Self::Temperature,
            "precipitation" | "precip" => Self::Precipitation,
            _ => Self::None,
        }
    }
}

/// The visible map area as last reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub bounds: GeoBounds,
    pub zoom: f64,
}

/// Cache and grids for one data request.
///
/// A rebuilt grid waits in `candidate` until its fetch succeeds; `grid` is
/// always the last one that was fully fetched.
struct GridState {
    cache: PointCache,
    grid: Option<Grid>,
    candidate: Option<Grid>,
}

impl GridState {
    /// Make the candidate current if it belongs to `generation`.
    fn promote(&mut self, generation: u64) {
        if self.candidate.as_ref().is_some_and(|g| g.generation == generation) {
            self.grid = self.candidate.take();
        }
    }

    /// The grid a refresh should fill: the candidate when there is one.
    fn target(&self) -> Option<&Grid> {
        self.candidate.as_ref().or(self.grid.as_ref())
    }
}

/// Points to fetch for one refresh, tagged with the grid generation they
/// were taken from.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    key: String,
    generation: u64,
    points: Vec<(PointKey, GeoPoint)>,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn points(&self) -> &[(PointKey, GeoPoint)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub struct WindSession<F: WeatherFetcher> {
    config: ViewerConfig,
    fetcher: F,
    resolver: GridResolver,
    request: DataRequest,
    grids: HashMap<String, GridState>,
    generation: u64,
    viewport: Option<Viewport>,
    viewport_debounce: Debouncer,
    rebuild_pending: bool,
    updates_enabled: bool,
    overlay: Overlay,
    size: Option<(u32, u32)>,
    wind: CanvasLayer<ParticleSimulator>,
    temperature: CanvasLayer<ScalarRenderer>,
    precipitation: CanvasLayer<ScalarRenderer>,
}

impl<F: WeatherFetcher> WindSession<F> {
    pub fn new(config: ViewerConfig, fetcher: F) -> Result<Self> {
        let simulator = ParticleSimulator::new(config.wind.clone());
        Self::with_simulator(config, fetcher, simulator)
    }

    /// Session with a reproducible particle layout.
    pub fn with_seed(config: ViewerConfig, fetcher: F, seed: u64) -> Result<Self> {
        let simulator = ParticleSimulator::with_seed(config.wind.clone(), seed);
        Self::with_simulator(config, fetcher, simulator)
    }

    fn with_simulator(config: ViewerConfig, fetcher: F, simulator: ParticleSimulator) -> Result<Self> {
        let resolver = resolver_for(&config.grid)?;
        let temperature = ScalarRenderer::new(ColorScale::temperature(), config.scalar.clone());
        let precipitation = ScalarRenderer::new(ColorScale::precipitation(), config.scalar.clone());

        let mut session = Self {
            resolver,
            request: config.session.request.clone(),
            grids: HashMap::new(),
            generation: 0,
            viewport: None,
            viewport_debounce: Debouncer::from_millis(config.session.viewport_debounce_ms),
            rebuild_pending: false,
            updates_enabled: config.session.updates_enabled,
            overlay: Overlay::None,
            size: None,
            wind: CanvasLayer::new(simulator),
            temperature: CanvasLayer::new(temperature),
            precipitation: CanvasLayer::new(precipitation),
            fetcher,
            config,
        };
        session.set_overlay(session.config.session.overlay)?;
        Ok(session)
    }

    // =========================================================================
    // Host lifecycle
    // =========================================================================

    pub fn attach(&mut self, width: u32, height: u32) -> Result<()> {
        self.wind.attach(width, height)?;
        self.temperature.attach(width, height)?;
        self.precipitation.attach(width, height)?;
        self.size = Some((width, height));
        info!(width, height, "session attached");
        Ok(())
    }

    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.wind.on_resize(width, height)?;
        self.temperature.on_resize(width, height)?;
        self.precipitation.on_resize(width, height)?;
        if self.size.is_some() {
            self.size = Some((width, height));
        }
        Ok(())
    }

    /// Record the new viewport, clear every layer and arm the rebuild timer.
    pub fn on_viewport_change(&mut self, bounds: GeoBounds, zoom: f64, now: Instant) {
        self.viewport = Some(Viewport { bounds, zoom });
        self.wind.on_viewport_change();
        self.temperature.on_viewport_change();
        self.precipitation.on_viewport_change();
        if self.updates_enabled {
            self.viewport_debounce.trigger(now);
            self.rebuild_pending = true;
        }
    }

    pub fn detach(&mut self) {
        self.wind.detach();
        self.temperature.detach();
        self.precipitation.detach();
        self.viewport_debounce.cancel();
        self.rebuild_pending = false;
        self.size = None;
        info!("session detached");
    }

    pub fn is_attached(&self) -> bool {
        self.size.is_some()
    }

    // =========================================================================
    // Grid lifecycle
    // =========================================================================

    fn resolve(&self, viewport: &Viewport) -> Result<Resolution> {
        let grid = &self.config.grid;
        let explicit = match (grid.point_distance, grid.step_policy) {
            (Some(step), _) => Some(step),
            (None, StepPolicy::Zoom) => Some(step_for_zoom(viewport.zoom)),
            (None, StepPolicy::PointBudget) => None,
        };
        Ok(self
            .resolver
            .resolve(&viewport.bounds, grid.max_grid_points, explicit)?)
    }

    /// Whether the current grid is missing, no longer covers the viewport,
    /// or was built at a different step than the viewport now calls for.
    pub fn needs_rebuild(&self) -> Result<bool> {
        let Some(viewport) = self.viewport else {
            return Ok(false);
        };
        let Some(grid) = self.grid() else {
            return Ok(true);
        };
        if !grid.covers(&viewport.bounds) {
            return Ok(true);
        }
        let resolution = self.resolve(&viewport)?;
        Ok(resolution.step != grid.point_distance)
    }

    /// Lay out a fresh grid for the current viewport and request. In-flight
    /// fetches for older grids are invalidated.
    ///
    /// The new grid only becomes current once a refresh has filled it.
    pub fn rebuild(&mut self) -> Result<&Grid> {
        let viewport = self.viewport.ok_or(SessionError::NoGrid)?;
        let resolution = self.resolve(&viewport)?;
        let capacity = self.config.grid.cache_capacity;

        self.generation += 1;
        let generation = self.generation;
        let state = self
            .grids
            .entry(self.request.key())
            .or_insert_with(|| GridState {
                cache: PointCache::new(capacity),
                grid: None,
                candidate: None,
            });
        let mut grid = Grid::from_resolution(&resolution, &mut state.cache);
        grid.generation = generation;

        counter!("wind_grid_rebuilds_total").increment(1);
        info!(
            request = %self.request.key(),
            generation,
            step = grid.point_distance,
            nx = grid.nx,
            ny = grid.ny,
            new_points = grid.new_points().len(),
            "grid rebuilt"
        );
        Ok(state.candidate.insert(grid))
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Snapshot the points the pending (or else current) grid still needs:
    /// never sampled, stale at `at`, or evicted from the cache.
    pub fn begin_refresh(&self, at: DateTime<Utc>) -> Result<RefreshTicket> {
        let state = self.current_state().ok_or(SessionError::NoGrid)?;
        let grid = state.target().ok_or(SessionError::NoGrid)?;
        Ok(RefreshTicket {
            key: self.request.key(),
            generation: grid.generation,
            points: grid.pending_points(&state.cache, at),
        })
    }

    /// Store fetched samples and push the new fields to the layers.
    ///
    /// Results for a superseded grid are dropped. A failed fetch leaves every
    /// cached sample and the current grid untouched. On success the pending
    /// grid becomes current. Returns the number of points stored.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: std::result::Result<Vec<SampleValue>, FetchError>,
        now: Instant,
    ) -> Result<usize> {
        if ticket.generation != self.generation || ticket.key != self.request.key() {
            counter!("wind_fetch_discarded_total").increment(1);
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale fetch result"
            );
            return Ok(0);
        }

        let samples = result?;
        if samples.len() != ticket.points.len() {
            return Err(FetchError::CountMismatch {
                expected: ticket.points.len(),
                actual: samples.len(),
            }
            .into());
        }

        let state = self.grids.get_mut(&ticket.key).ok_or(SessionError::NoGrid)?;
        let mut stored = 0;
        for ((key, _), sample) in ticket.points.iter().zip(samples) {
            if state.cache.set_sample(key, sample) {
                stored += 1;
            }
        }
        state.promote(ticket.generation);
        counter!("wind_fetch_points_total").increment(stored as u64);
        debug!(stored, generation = ticket.generation, "samples stored");

        self.apply_layers(now);
        Ok(stored)
    }

    /// Fetch every pending point of the current grid and feed the layers.
    pub async fn refresh(&mut self, now: Instant) -> Result<usize> {
        let ticket = self.begin_refresh(Utc::now())?;
        if ticket.is_empty() {
            if let Some(state) = self.grids.get_mut(&ticket.key) {
                state.promote(ticket.generation);
            }
            self.apply_layers(now);
            return Ok(0);
        }
        let result = self.fetch(&ticket).await;
        self.complete_refresh(ticket, result, now)
    }

    async fn fetch(&self, ticket: &RefreshTicket) -> std::result::Result<Vec<SampleValue>, FetchError> {
        let points: Vec<GeoPoint> = ticket.points.iter().map(|(_, p)| *p).collect();
        let batch = self.config.session.fetch_batch_size.max(1);
        debug!(
            points = points.len(),
            batches = points.len().div_ceil(batch),
            "fetching samples"
        );
        let batches = points
            .chunks(batch)
            .map(|chunk| self.fetcher.fetch(&self.request, chunk));
        let results = try_join_all(batches).await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Rebuild the wind records and scalar fields from the cache.
    fn apply_layers(&mut self, now: Instant) {
        let Some(state) = self.grids.get(&self.request.key()) else {
            return;
        };
        let Some(grid) = state.grid.as_ref() else {
            return;
        };

        match wind_records(grid, &state.cache) {
            Ok(records) => self.wind.drawable_mut().set_data(records),
            Err(err) => warn!(error = %err, "could not assemble wind field"),
        }
        match scalar_field(grid, &state.cache, ScalarParameter::Temperature) {
            Ok(field) => self.temperature.drawable_mut().update(Some(field), now),
            Err(err) => warn!(error = %err, "could not assemble temperature field"),
        }
        match scalar_field(grid, &state.cache, ScalarParameter::Precipitation) {
            Ok(field) => self.precipitation.drawable_mut().update(Some(field), now),
            Err(err) => warn!(error = %err, "could not assemble precipitation field"),
        }
    }

    // =========================================================================
    // Requests, queries and toggles
    // =========================================================================

    /// Switch to another data request. Its grid is rebuilt against its own
    /// cache, so returning to an earlier request reuses its samples.
    pub async fn select_request(&mut self, request: DataRequest, now: Instant) -> Result<usize> {
        if request == self.request {
            return Ok(0);
        }
        info!(from = %self.request.key(), to = %request.key(), "switching data request");
        self.request = request;
        self.generation += 1;
        if self.viewport.is_none() {
            return Ok(0);
        }
        self.rebuild()?;
        self.refresh(now).await
    }

    /// Interpolated weather at a coordinate of the current grid.
    pub fn sample_at(&self, lat: f64, lon: f64) -> Result<InterpolatedSample> {
        let state = self.current_state().ok_or(SessionError::NoGrid)?;
        let grid = state.grid.as_ref().ok_or(SessionError::NoGrid)?;
        Ok(sample_at(grid, &state.cache, lat, lon)?)
    }

    /// Pause or resume viewport-driven rebuilds. Returns the new state.
    pub fn toggle_updates(&mut self, now: Instant) -> bool {
        self.updates_enabled = !self.updates_enabled;
        if self.updates_enabled {
            if self.viewport.is_some() {
                self.viewport_debounce.trigger(now);
                self.rebuild_pending = true;
            }
        } else {
            self.viewport_debounce.cancel();
            self.rebuild_pending = false;
        }
        info!(enabled = self.updates_enabled, "viewport updates toggled");
        self.updates_enabled
    }

    /// Show one scalar overlay (hiding the other) or none.
    ///
    /// Particles turn white over an overlay and get the configured colors
    /// back when it is hidden.
    pub fn set_overlay(&mut self, overlay: Overlay) -> Result<()> {
        let patch = match overlay {
            Overlay::None => OptionsPatch::from(&self.config.wind),
            Overlay::Temperature | Overlay::Precipitation => OptionsPatch::color_scale(vec![Rgb::WHITE]),
        };
        self.wind.drawable_mut().set_options(&patch)?;
        if overlay != self.overlay {
            // Force a repaint of the newly shown layer.
            match overlay {
                Overlay::Temperature => self.temperature.on_viewport_change(),
                Overlay::Precipitation => self.precipitation.on_viewport_change(),
                Overlay::None => {}
            }
            debug!(?overlay, "overlay changed");
        }
        self.overlay = overlay;
        Ok(())
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Run whatever is due at `now`: a debounced grid rebuild with its fetch,
    /// then one render pass. Returns true when any layer painted.
    ///
    /// A viewport still covered by the current grid only repaints. A failed
    /// fetch re-arms the rebuild timer, so the next quiet period retries it.
    pub async fn tick(&mut self, projector: &dyn CoordinateProjector, now: Instant) -> Result<bool> {
        if self.rebuild_pending && self.viewport_debounce.poll(now) {
            self.rebuild_pending = false;
            if self.needs_rebuild()? {
                self.rebuild()?;
            } else if let Some(state) = self.grids.get_mut(&self.request.key()) {
                // Back inside the current grid; an unfetched one is moot.
                state.candidate = None;
            }
            if self.pending_grid().is_some() {
                if let Err(err) = self.refresh(now).await {
                    if self.updates_enabled {
                        self.viewport_debounce.trigger(now);
                        self.rebuild_pending = true;
                    }
                    return Err(err);
                }
            }
        }
        self.render(projector, now)
    }

    /// Draw the wind layer and the visible overlay.
    pub fn render(&mut self, projector: &dyn CoordinateProjector, now: Instant) -> Result<bool> {
        if !self.is_attached() {
            return Err(SessionError::NotAttached);
        }
        let mut painted = self.wind.render(projector, now)?;
        painted |= match self.overlay {
            Overlay::Temperature => self.temperature.render(projector, now)?,
            Overlay::Precipitation => self.precipitation.render(projector, now)?,
            Overlay::None => false,
        };
        Ok(painted)
    }

    /// Flatten the visible overlay and the particles into one image.
    pub fn composite(&self) -> Result<Pixmap> {
        let (width, height) = self.size.ok_or(SessionError::NotAttached)?;
        let mut out = Pixmap::new(width, height).ok_or(RenderError::InvalidCanvasSize { width, height })?;

        let overlay = match self.overlay {
            Overlay::Temperature => self.temperature.canvas(),
            Overlay::Precipitation => self.precipitation.canvas(),
            Overlay::None => None,
        };
        for canvas in overlay.into_iter().chain(self.wind.canvas()) {
            out.draw_pixmap(
                0,
                0,
                canvas.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Ok(out)
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let rebuild = self
            .rebuild_pending
            .then(|| self.viewport_debounce.deadline())
            .flatten();
        let overlay = match self.overlay {
            Overlay::Temperature => self.temperature.next_deadline(),
            Overlay::Precipitation => self.precipitation.next_deadline(),
            Overlay::None => None,
        };
        [rebuild, self.wind.next_deadline(), overlay]
            .into_iter()
            .flatten()
            .min()
    }

    /// Time until [`next_deadline`](Self::next_deadline), zero when overdue.
    pub fn time_to_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline().map(|at| at.saturating_duration_since(now))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn current_state(&self) -> Option<&GridState> {
        self.grids.get(&self.request.key())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn request(&self) -> &DataRequest {
        &self.request
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// The last fully fetched grid.
    pub fn grid(&self) -> Option<&Grid> {
        self.current_state().and_then(|s| s.grid.as_ref())
    }

    /// A rebuilt grid still waiting for its fetch.
    pub fn pending_grid(&self) -> Option<&Grid> {
        self.current_state().and_then(|s| s.candidate.as_ref())
    }

    pub fn cache(&self) -> Option<&PointCache> {
        self.current_state().map(|s| &s.cache)
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay
    }

    pub fn updates_enabled(&self) -> bool {
        self.updates_enabled
    }

    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn wind_layer(&self) -> &CanvasLayer<ParticleSimulator> {
        &self.wind
    }

    pub fn temperature_layer(&self) -> &CanvasLayer<ScalarRenderer> {
        &self.temperature
    }

    pub fn precipitation_layer(&self) -> &CanvasLayer<ScalarRenderer> {
        &self.precipitation
    }
}

fn resolver_for(config: &GridConfig) -> Result<GridResolver> {
    Ok(GridResolver::new(&config.step_ladder)?.with_adjustment(config.adjustment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_from_str() {
        assert_eq!(Overlay::from_str("Temperature"), Overlay::Temperature);
        assert_eq!(Overlay::from_str("precip"), Overlay::Precipitation);
        assert_eq!(Overlay::from_str("wind"), Overlay::None);
    }

    #[test]
    fn test_overlay_serde() {
        let overlay: Overlay = serde_json::from_str(r#""precipitation""#).unwrap();
        assert_eq!(overlay, Overlay::Precipitation);
    }
}
